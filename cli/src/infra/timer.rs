use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::Timer;

pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
