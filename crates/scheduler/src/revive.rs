//! Rate limiting for offer-revival calls.

use std::time::Duration;

use tokio::sync::mpsc;

/// Produces a token channel with `burst` capacity. The channel starts full
/// and one slot is refilled every `wait / burst`, so consumers doing
/// non-blocking reads are bounded to at most `burst` tokens per `wait`
/// window on average. The refill task stops once the receiver is dropped.
pub fn tokens(burst: usize, wait: Duration) -> mpsc::Receiver<()> {
    let burst = burst.max(1);
    let (tx, rx) = mpsc::channel(burst);
    for _ in 0..burst {
        let _ = tx.try_send(());
    }

    let period = (wait / burst as u32).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut refill = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            refill.tick().await;
            if tx.is_closed() {
                return;
            }
            // A full channel just means nobody spent the burst; drop the
            // token.
            let _ = tx.try_send(());
        }
    });

    rx
}
