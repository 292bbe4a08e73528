pub mod assignment;
pub mod event;
pub mod lead;
pub mod mailbox;
pub mod send_job;
pub mod tenant;
pub mod tracking;

pub use assignment::{AssignmentStatus, LeadMailboxAssignment};
pub use event::{EngagementEvent, EventType, NewEngagementEvent};
pub use lead::LeadMetrics;
pub use mailbox::{IdentityStatus, MailboxIdentity};
pub use send_job::{JobStatus, NewSendJob, SendJob};
pub use tenant::TenantSendLimit;
pub use tracking::{ClickTracking, TrackingPixel};
