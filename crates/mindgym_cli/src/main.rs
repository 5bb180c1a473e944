use anyhow::Context;
use clap::Parser;
use mindgym_core::{GymConfig, Stimulus};
use mindgym_reasoning::providers::{MockFastProducer, MockSlowProducer};
use mindgym_workout::{MindGym, StepReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to work out
    query: String,

    /// TOML config file (defaults are used if it does not exist)
    #[arg(short, long, env = "MINDGYM_CONFIG", default_value = "mindgym.toml")]
    config: PathBuf,

    /// Stop after this many steps even if the session is still going
    #[arg(short, long, default_value_t = 64)]
    steps: u32,

    /// Latency of each mock fast call
    #[arg(long, default_value_t = 20)]
    fast_latency_ms: u64,

    /// Latency of each mock slow dialogue round
    #[arg(long, default_value_t = 100)]
    slow_latency_ms: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Print every step report as a JSON line instead of text
    #[arg(long)]
    report_json: bool,

    /// Draw the grid after every step
    #[arg(long)]
    show_grid: bool,

    /// Write the final pattern as a PGM image
    #[arg(long)]
    pgm: Option<PathBuf>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &StepReport) {
    let s = &report.somatic;
    let h = &report.pattern_health;
    println!(
        "step {:>3} | {:<17} | stress {:.2} arousal {:.2} valence {:+.2} coherence {:.2} tension {:.2} | {} density {:.3} | difficulty {}",
        report.step,
        report.phase.as_str(),
        s.stress,
        s.vector.arousal,
        s.vector.valence,
        s.vector.coherence,
        s.vector.tension,
        h.state.as_str(),
        h.density,
        report.difficulty,
    );
    for (selected, refined) in report.selected_thoughts.iter().zip(&report.refined_thoughts) {
        println!("    fast ({:.2}) {}", selected.confidence(), selected.content());
        if refined.is_placeholder() {
            println!("    slow  (--)  <no answer>");
        } else {
            println!("    slow ({:.2}) {}", refined.confidence(), refined.content());
        }
    }
    for condition in &report.conditions {
        println!("    ! {}", condition);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let config = GymConfig::load_or_default(&args.config);
    info!("Starting workout on {:?}", args.query);

    let gym = MindGym::new(
        Arc::new(MockFastProducer::new(Duration::from_millis(args.fast_latency_ms))),
        Arc::new(MockSlowProducer::new(Duration::from_millis(args.slow_latency_ms))),
    );
    let handle = gym
        .start_session(Stimulus::new(args.query.clone()), config)
        .await
        .context("Failed to start session")?;

    // Ctrl-C sends the session to rest instead of killing it
    let mut steps = 0;
    while steps < args.steps && !gym.is_complete(handle).await? {
        let report = tokio::select! {
            report = gym.step(handle) => report?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, sending session to rest");
                gym.cancel(handle).await?;
                break;
            }
        };
        steps += 1;

        if args.report_json {
            println!("{}", report.to_json()?);
        } else {
            print_report(&report);
        }
        if args.show_grid {
            print!("{}", gym.export_pattern(handle).await?.to_ascii());
        }
    }

    if let Some(resolution) = gym.integrate_branch(handle).await? {
        info!(
            "Rest branch scored {:.2}: {:?}",
            resolution.score, resolution.decision
        );
    }

    let frame = gym.export_pattern(handle).await?;
    if let Some(path) = &args.pgm {
        std::fs::write(path, frame.to_pgm())
            .with_context(|| format!("Failed to write pattern to {}", path.display()))?;
        info!("Pattern written to {}", path.display());
    }
    if !args.report_json {
        println!("\nfinal pattern (generation {}):", frame.generation);
        print!("{}", frame.to_ascii());
    }

    let snapshot = gym.inspect(handle).await?;
    info!(
        "Session finished after {} step(s), {} thought(s), difficulty {}",
        steps,
        snapshot.thoughts.len(),
        snapshot.difficulty
    );
    Ok(())
}
