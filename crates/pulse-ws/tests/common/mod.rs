pub mod mock_feed;

use std::time::Duration;

/// Poll `cond` until it holds or five seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
