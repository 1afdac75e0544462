use async_trait::async_trait;
use rand::Rng;
use tracing::info;

/// Six decimal digits, no leading zero. Not cryptographically random; the
/// code is single use and expires within minutes.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Delivers password reset codes to their owner.
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send_otp(&self, email: &str, otp: &str, ttl_minutes: i64) -> anyhow::Result<()>;
}

/// Development transport: writes the code to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl OtpNotifier for LogNotifier {
    async fn send_otp(&self, email: &str, otp: &str, ttl_minutes: i64) -> anyhow::Result<()> {
        info!(%email, %otp, ttl_minutes, "password reset code issued (log transport)");
        Ok(())
    }
}
