use super::NotificationPresenter;
use tokio::process::Command;

/// Writes notices to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl NotificationPresenter for LogNotifier {
    fn present(&self, title: &str, body: &str) {
        log::info!("Notification: {}: {}", title, body);
    }
}

/// Runs an external program with the title and body as its two arguments,
/// e.g. `notify-send`. Also logs the notice.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl NotificationPresenter for CommandNotifier {
    fn present(&self, title: &str, body: &str) {
        LogNotifier.present(title, body);

        let mut command = Command::new(&self.program);
        command.arg(title).arg(body);
        let program = self.program.clone();

        tokio::spawn(async move {
            match command.status().await {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!("{} exited with {}", program, status),
                Err(e) => log::warn!("Could not run {}: {}", program, e),
            }
        });
    }
}
