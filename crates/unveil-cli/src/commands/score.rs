use std::path::PathBuf;

use clap::Args;
use unveil_core::{ConversationFeatures, ReadinessScorer, RevealConfig};

#[derive(Args)]
pub struct ScoreArgs {
    /// Path to a conversation features JSON snapshot
    #[arg(long)]
    features: PathBuf,
}

pub fn run(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = RevealConfig::load_or_default();
    let text = std::fs::read_to_string(&args.features)?;
    let features: ConversationFeatures = serde_json::from_str(&text)?;

    let scorer = ReadinessScorer::new()
        .with_volume_thresholds(config.admission.min_messages, config.admission.confidence_window)
        .with_secondary_blend(config.admission.secondary_blend);
    let breakdown = scorer.score(&features);

    println!("{}", serde_json::to_string_pretty(&breakdown)?);
    if breakdown.final_score >= config.admission.threshold {
        eprintln!(
            "score {:.3} clears the admission threshold {:.2}",
            breakdown.final_score, config.admission.threshold
        );
    } else {
        eprintln!(
            "score {:.3} is below the admission threshold {:.2}",
            breakdown.final_score, config.admission.threshold
        );
    }
    Ok(())
}
