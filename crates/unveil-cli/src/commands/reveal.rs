//! Reveal protocol commands.
//!
//! Each invocation builds a coordinator over the local SQLite store and
//! runs one operation. Features come from a JSON snapshot file; daily
//! usage is counted from the store itself. Events are printed as JSON
//! lines, the resulting record as pretty JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Subcommand, ValueEnum};
use unveil_core::error::CoreError;
use unveil_core::{
    ConversationFeatures, Event, FeatureSource, NotificationSink, RevealConfig,
    RevealCoordinator, RevealRequest, RevealResponse, SqliteRevealStore, Tier, UsageSource,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum TierArg {
    Free,
    Plus,
    Unlimited,
}

impl From<TierArg> for Tier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Free => Tier::Free,
            TierArg::Plus => Tier::Plus,
            TierArg::Unlimited => Tier::Unlimited,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ResponseArg {
    Accept,
    Decline,
    NotReady,
}

impl From<ResponseArg> for RevealResponse {
    fn from(response: ResponseArg) -> Self {
        match response {
            ResponseArg::Accept => RevealResponse::Accept,
            ResponseArg::Decline => RevealResponse::Decline,
            ResponseArg::NotReady => RevealResponse::NotReady,
        }
    }
}

#[derive(Subcommand)]
pub enum RevealAction {
    /// Request a reveal for a conversation
    Request {
        /// Conversation ID
        #[arg(long)]
        conversation: String,
        /// Requesting user ID
        #[arg(long)]
        from: String,
        /// Target user ID
        #[arg(long)]
        to: String,
        /// Requester's subscription tier
        #[arg(long, value_enum, default_value = "free")]
        tier: TierArg,
        /// Optional message for the target
        #[arg(long)]
        message: Option<String>,
        /// Path to a conversation features JSON snapshot
        #[arg(long)]
        features: PathBuf,
    },
    /// Answer a pending request (target only)
    Respond {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
        #[arg(long, value_enum)]
        response: ResponseArg,
        #[arg(long)]
        message: Option<String>,
        /// Features snapshot, used for not-ready guidance
        #[arg(long)]
        features: Option<PathBuf>,
    },
    /// Submit your intention for the reveal
    Intention {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        text: String,
    },
    /// Submit your readiness (true/false)
    Ready {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
        #[arg(long, action = clap::ArgAction::Set)]
        ready: bool,
    },
    /// Advance past the countdown without waiting it out
    Continue {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
    },
    /// Stop the reveal during the countdown
    Abort {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
    },
    /// Print the record and guidance as JSON
    Status {
        #[arg(long)]
        reveal: String,
        #[arg(long)]
        user: String,
    },
}

/// Reads the features snapshot lazily, at scoring time.
struct FileFeatures {
    path: Option<PathBuf>,
}

impl FeatureSource for FileFeatures {
    fn conversation_features(
        &self,
        _conversation_id: &str,
    ) -> Result<ConversationFeatures, CoreError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| CoreError::Custom("no features snapshot supplied".into()))?;
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Counts today's requests straight from the store.
struct StoreUsage(Arc<SqliteRevealStore>);

impl UsageSource for StoreUsage {
    fn used_today(&self, user_id: &str) -> Result<u32, CoreError> {
        Ok(self.0.requested_today(user_id)?)
    }
}

/// Prints each event as one JSON line on stderr, keeping stdout for the
/// resulting record.
struct JsonLineSink;

impl NotificationSink for JsonLineSink {
    fn deliver(&self, event: &Event) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{line}");
        }
    }
}

fn build_coordinator(
    features: Option<PathBuf>,
) -> Result<Arc<RevealCoordinator>, Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteRevealStore::open()?);
    let usage = Arc::new(StoreUsage(store.clone()));
    let config = RevealConfig::load_or_default();
    Ok(RevealCoordinator::new(
        config,
        store,
        Arc::new(FileFeatures { path: features }),
        usage,
        Arc::new(JsonLineSink),
    ))
}

pub fn run(action: RevealAction) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let outcome: Result<(), Box<dyn std::error::Error>> = runtime.block_on(async {
        match action {
            RevealAction::Request {
                conversation,
                from,
                to,
                tier,
                message,
                features,
            } => {
                let coordinator = build_coordinator(Some(features))?;
                let reveal = coordinator
                    .request_reveal(RevealRequest {
                        conversation_id: conversation,
                        requester_id: from,
                        target_id: to,
                        tier: tier.into(),
                        message,
                    })
                    .await?;
                println!("{}", serde_json::to_string_pretty(&reveal)?);
            }
            RevealAction::Respond {
                reveal,
                user,
                response,
                message,
                features,
            } => {
                let coordinator = build_coordinator(features)?;
                let record = coordinator
                    .respond_to_reveal(&reveal, &user, response.into(), message)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            RevealAction::Intention { reveal, user, text } => {
                let coordinator = build_coordinator(None)?;
                let record = coordinator.submit_intention(&reveal, &user, &text).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            RevealAction::Ready {
                reveal,
                user,
                ready,
            } => {
                let coordinator = build_coordinator(None)?;
                let record = coordinator.submit_readiness(&reveal, &user, ready).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            RevealAction::Continue { reveal, user } => {
                let coordinator = build_coordinator(None)?;
                let record = coordinator.continue_countdown(&reveal, &user).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            RevealAction::Abort { reveal, user } => {
                let coordinator = build_coordinator(None)?;
                let record = coordinator.abort(&reveal, &user).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            RevealAction::Status { reveal, user } => {
                let coordinator = build_coordinator(None)?;
                let summary = coordinator.get_status(&reveal, &user)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }
        Ok(())
    });
    outcome
}
