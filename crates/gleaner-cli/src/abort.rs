use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Listen for an operator abort: Ctrl-C, or a line starting with `q` on
/// stdin. Either cancels the token; the run then drains and checkpoints
/// at the next cycle boundary.
pub fn spawn_abort_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, draining run");
                    cancel.cancel();
                    return;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) if line.trim().starts_with('q') => {
                            tracing::info!("Quit requested, draining run");
                            cancel.cancel();
                            return;
                        }
                        Ok(Some(_)) => {}
                        // stdin closed (detached terminal); Ctrl-C still works.
                        Ok(None) | Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            cancel.cancel();
                            return;
                        }
                    }
                }
            }
        }
    });
}
