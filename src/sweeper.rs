//! ## 日本語
//!
//! token 発行後にユーザーインデックスの古いエントリを掃除するバックグラウンドワーカーです。
//!
//! [`crate::RSessionBuilder::build_with_sweeper`] が返す [`IndexSweeper`] を呼び出し側が
//! `tokio::spawn(sweeper.run())` で起動します。発行処理はユーザー ID をキューに積むだけで、
//! 掃除の完了を待ちません。掃除の失敗は `warn!` でログに出し、発行側には返しません。
//!
//! ## English
//!
//! Background worker that sweeps stale user index entries after issuance.
//!
//! [`crate::RSessionBuilder::build_with_sweeper`] hands out an [`IndexSweeper`] which the
//! caller spawns with `tokio::spawn(sweeper.run())`. Issuance only enqueues the user id
//! and never waits for the sweep. Sweep failures are logged with `warn!` and never reach
//! the issuer.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::token_store::RTokenStore;

/// Sending side held by the token store.
#[derive(Clone)]
pub(crate) struct SweepQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl SweepQueue {
    pub(crate) fn enqueue(&self, user_id: &str) {
        if self.tx.send(user_id.to_string()).is_err() {
            debug!(user_id = %user_id, "index sweeper is not running, sweep skipped");
        }
    }
}

/// ## 日本語
///
/// インデックス掃除ワーカーです。すべての [`crate::RSessionManager`] が drop されると
/// `run` が終了し、削除したエントリの合計数を返します。
///
/// ## English
///
/// Index sweep worker. `run` ends once every [`crate::RSessionManager`] handle has been
/// dropped and returns the total number of entries purged.
pub struct IndexSweeper {
    // Must not hold a queue itself, or the channel would never close.
    tokens: RTokenStore,
    rx: mpsc::UnboundedReceiver<String>,
}

impl IndexSweeper {
    pub(crate) fn channel(tokens: RTokenStore) -> (SweepQueue, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SweepQueue { tx }, Self { tokens, rx })
    }

    /// ## 日本語
    ///
    /// キューが閉じるまでユーザー ID を受け取り、インデックスを掃除し続けます。
    /// 溜まっている ID はまとめて取り出し、同じユーザーは 1 回だけ掃除します。
    ///
    /// ## English
    ///
    /// Sweeps user indexes until the queue closes. Pending ids are drained together and
    /// each user is swept once per drain.
    pub async fn run(mut self) -> usize {
        let mut purged = 0;
        while let Some(first) = self.rx.recv().await {
            let mut pending = BTreeSet::from([first]);
            while let Ok(user_id) = self.rx.try_recv() {
                pending.insert(user_id);
            }

            for user_id in pending {
                match self.tokens.sweep_user_index(&user_id).await {
                    Ok(count) => purged += count,
                    Err(err) => warn!(user_id = %user_id, error = %err, "index sweep failed"),
                }
            }
        }
        debug!(purged, "index sweeper stopped");
        purged
    }
}
