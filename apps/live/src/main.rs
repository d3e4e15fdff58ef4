use std::process::ExitCode;
use std::thread;

use broker::PaperBroker;
use config::AgentConfig;
use ratchet::{AgentError, init_logging, parse_level};
use runtime::{Agent, StopFlag};
use tracing::Level;

const DEFAULT_CONFIG: &str = "demos/agent.yaml";

fn main() -> ExitCode {
	let path = std::env::args()
		.nth(1)
		.or_else(|| std::env::var("AGENT_CONFIG").ok())
		.unwrap_or_else(|| DEFAULT_CONFIG.to_string());

	let config = match AgentConfig::load(&path) {
		Ok(config) => config,
		Err(error) => {
			init_logging(Level::INFO);
			tracing::error!(path = %path, error = %error, "config rejected");
			return ExitCode::FAILURE;
		}
	};
	init_logging(parse_level(&config.agent.log_level));
	tracing::info!(path = %path, "config loaded");

	match run(config) {
		Ok(()) => ExitCode::SUCCESS,
		Err(error) => {
			tracing::error!(error = %error, kind = error.kind(), "agent stopped");
			ExitCode::FAILURE
		}
	}
}

fn run(config: AgentConfig) -> Result<(), AgentError> {
	let paper = config
		.paper
		.clone()
		.ok_or_else(|| AgentError::Config("live binary needs a paper section".to_string()))?;

	let mut broker = PaperBroker::new(paper.start, paper.cash);
	for instrument in &config.instruments {
		broker.add_instrument(instrument.clone());
	}
	for (instrument_id, file) in &paper.data {
		let count = broker.load_csv(instrument_id.clone(), file)?;
		tracing::info!(instrument = %instrument_id, bars = count, file = %file.display(), "bars loaded");
	}

	let stop = StopFlag::new();
	install_interrupt(stop.clone());

	let mut agent = Agent::new(config, broker)?;
	let summary = agent.run(&stop)?;
	tracing::info!(
		cycles = summary.cycles,
		skipped = summary.skipped,
		signals = summary.signals,
		orders = summary.orders,
		"agent finished"
	);
	Ok(())
}

fn install_interrupt(stop: StopFlag) {
	thread::spawn(move || {
		let runtime = match tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
		{
			Ok(rt) => rt,
			Err(error) => {
				tracing::warn!(error = %error, "interrupt handler unavailable");
				return;
			}
		};
		runtime.block_on(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::info!("ctrl-c received");
				stop.raise();
			}
		});
	});
}
