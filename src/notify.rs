use log::info;

pub const DISTRACTION_TITLE: &str = "Come back!";

pub fn distraction_body(pet_name: &str) -> String {
    format!("{pet_name} gets sad when you leave!")
}

/// Best-effort user notifications. Delivery failures are the implementation's problem.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("[notification] {title}: {body}");
    }
}
