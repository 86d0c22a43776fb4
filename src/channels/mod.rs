//! Outbound delivery: the workflow engine, the chat transport, and the
//! strategy that picks between them.

pub mod dispatcher;
pub mod phone;
pub mod transport;
pub mod workflow;

pub use dispatcher::{ChannelDispatcher, DirectSink, DispatchRequest, RegistrationOutcome};
pub use transport::{BaileysTransport, ChannelTransport, SendReceipt, TransportStatus};
pub use workflow::{NovuClient, TriggerRequest, WorkflowEngine};
