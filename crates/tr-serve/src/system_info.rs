use chrono::Utc;
use std::time::Duration;
use tokio::process::Command;
use tr_events::SystemInfo;

const PROBE: &str = r#"uname -a && ps aux | grep -E "(kind|kubectl|helm)" | grep -v grep"#;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const UNAVAILABLE: &str = "System info unavailable";

/// Best-effort host description for observers that ask for it.
pub async fn collect() -> SystemInfo {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new("sh").arg("-c").arg(PROBE).kill_on_drop(true).output(),
    )
    .await;

    let (system, error) = match output {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let error = (!output.status.success()).then(|| {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.is_empty() {
                    format!("probe exited with {}", output.status)
                } else {
                    stderr
                }
            });
            (stdout, error)
        }
        Ok(Err(err)) => (String::new(), Some(err.to_string())),
        Err(_) => (String::new(), Some("probe timed out".to_string())),
    };

    SystemInfo {
        timestamp: Utc::now(),
        system: if system.trim().is_empty() {
            UNAVAILABLE.to_string()
        } else {
            system
        },
        error,
    }
}
