pub mod assignment;
pub mod dispatcher;
pub mod events;
pub mod mailbox_pool;
pub mod maintenance;
pub mod replies;
pub mod send_queue;
pub mod tenant_limits;
pub mod tracking;
