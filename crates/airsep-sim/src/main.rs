//! Run a conflict scenario through the CD&R engine and report the outcome.

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airsep_core::geometry::{bearing_distance, NM};
use airsep_core::{AreaRegistry, Asas, Traffic};
use airsep_sim::{build, ScenarioKind, SimTraffic};

#[derive(Debug, Parser)]
#[command(name = "airsep-sim", about = "Airborne separation assurance scenario runner")]
struct Args {
    /// Encounter geometry to simulate.
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// Simulated duration [s].
    #[arg(long, default_value_t = 300.0)]
    duration: f64,

    /// Integration timestep [s].
    #[arg(long, default_value_t = 1.0)]
    dt: f64,

    /// Horizontal separation minimum [NM].
    #[arg(long, default_value_t = 5.0)]
    radius_nm: f64,

    /// Conflict lookahead horizon [s].
    #[arg(long, default_value_t = 300.0)]
    lookahead: f64,

    /// Resolution method (MVP or OFF).
    #[arg(long, default_value = "MVP")]
    resolver: String,

    /// Priority rule set (FF1, FF2, FF3, LAY1, LAY2).
    #[arg(long)]
    priority: Option<String>,
}

/// Tightest pairwise separation seen over the run.
#[derive(Debug)]
struct SeparationTrace {
    min_horizontal_m: f64,
    min_horizontal_while_vertical_overlap_m: f64,
}

impl SeparationTrace {
    fn new() -> Self {
        Self {
            min_horizontal_m: f64::INFINITY,
            min_horizontal_while_vertical_overlap_m: f64::INFINITY,
        }
    }

    fn sample(&mut self, traf: &SimTraffic, vertical_half_height_m: f64) {
        for i in 0..traf.count() {
            for j in (i + 1)..traf.count() {
                let (a, b) = match (traf.state(i), traf.state(j)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };
                let (_, dist) = bearing_distance(a.lat, a.lon, b.lat, b.lon);
                self.min_horizontal_m = self.min_horizontal_m.min(dist);
                if (a.alt_m - b.alt_m).abs() < vertical_half_height_m {
                    self.min_horizontal_while_vertical_overlap_m =
                        self.min_horizontal_while_vertical_overlap_m.min(dist);
                }
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut asas = Asas::default();
    asas.config_mut().set_detection_radius(args.radius_nm * NM)?;
    asas.config_mut().set_lookahead(args.lookahead)?;
    asas.config_mut().set_priority(args.priority.as_deref())?;
    asas.set_resolver(&args.resolver)?;

    let areas = AreaRegistry::new();
    let mut traf = build(args.scenario, 0.0, 0.0);
    let mut trace = SeparationTrace::new();

    tracing::info!(
        scenario = args.scenario.name(),
        resolver = asas.resolver_name(),
        "starting run"
    );

    let steps = (args.duration / args.dt).ceil() as usize;
    let mut simt = 0.0;
    for _ in 0..steps {
        asas.update(&mut traf, &areas, simt);
        traf.step(&asas, args.dt);
        simt += args.dt;
        trace.sample(&traf, asas.config().vertical_half_height_m);
    }

    let radius_m = asas.config().detection_radius_m;
    let separation_maintained =
        trace.min_horizontal_while_vertical_overlap_m >= radius_m;
    let summary = json!({
        "scenario": args.scenario.name(),
        "resolver": asas.resolver_name(),
        "duration_s": args.duration,
        "conflicts_total": asas.tracker().total_conflicts(),
        "losses_total": asas.tracker().total_losses(),
        "los_events_logged": asas.tracker().los_logged_events(),
        "min_horizontal_sep_m": finite_or_null(trace.min_horizontal_m),
        "min_horizontal_sep_while_vertical_overlap_m":
            finite_or_null(trace.min_horizontal_while_vertical_overlap_m),
        "separation_maintained": separation_maintained,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn finite_or_null(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
