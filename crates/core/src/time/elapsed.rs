use std::time::Duration;

/// `mm:ss` as shown next to the spinner while a request is in flight.
///
/// Minutes are not wrapped into hours; the services answer within a couple of minutes.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
