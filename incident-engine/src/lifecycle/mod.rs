//! Incident lifecycle: state model, ticket projection and the pipeline that
//! drives both.

pub mod pipeline;
pub mod state;
pub mod ticket;

pub use pipeline::{Collaborators, Detection, IncidentLifecycle, IncidentReport, LifecycleError};
pub use state::{IllegalTransition, Incident, IncidentState, TransitionRecord};
pub use ticket::{TicketStateView, TicketStatus, TicketTransitionError, ESCALATED_TAG};
