//! Flow session orchestration — tokens, dispatch, delivery, normalization,
//! and the completion router.

pub mod dispatch;
pub mod normalize;
pub mod payload;
pub mod router;
pub mod routes;
pub mod sender;
pub mod token;

pub use dispatch::{DispatchOutcome, FlowDispatcher, FlowHandler};
pub use normalize::{LabelCatalog, PayloadNormalizer, ValidationReport};
pub use payload::RawFlowPayload;
pub use router::{PassthroughDecryptor, PayloadDecryptor, WebhookRouter};
pub use sender::{FlowSender, SendOutcome};
pub use token::{FlowType, FlowTokenRecord, TokenStore};
