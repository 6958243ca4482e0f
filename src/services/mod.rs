//! Services shared by the batch processor, the job runner and the API.

pub mod notifications;

pub use notifications::NotificationService;
