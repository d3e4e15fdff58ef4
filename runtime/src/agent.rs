use std::collections::VecDeque;

use broker::{Broker, WaitPolicy};
use chrono::{DateTime, Duration, Timelike, Utc};
use config::{AgentConfig, AgentSettings, EndingProcess};
use market::BarSeriesRegistry;
use order::{OrderId, OrderIntent};
use portfolio::EqualWeightAllocator;
use ratchet::utils::{floor_to, push_bounded, HISTORY_LEN};
use ratchet::{AgentError, InstrumentRegistry, SignalBook};
use risk::Guardrails;
use strategy::BreakoutStrategy;

use crate::stop::StopFlag;

/// Result of one pass of the control loop.
#[derive(Debug)]
pub enum CycleOutcome {
	Completed { signals: usize, orders: usize },
	/// The cycle stopped early on a recoverable condition; the loop goes on.
	Skipped(String),
	/// An interrupt arrived while waiting for the venue.
	Interrupted,
	Fatal(AgentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
	Interrupt,
	Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentSummary {
	pub cycles: u64,
	pub skipped: u64,
	pub signals: usize,
	pub orders: usize,
}

pub struct Agent<B: Broker> {
	settings: AgentSettings,
	broker: B,
	instruments: InstrumentRegistry,
	registry: BarSeriesRegistry,
	strategies: Vec<BreakoutStrategy>,
	allocators: Vec<EqualWeightAllocator>,
	signals: SignalBook,
	guardrails: Guardrails,
	wait_policy: WaitPolicy,
	orders: VecDeque<(OrderId, OrderIntent)>,
	summary: AgentSummary,
	started_at: Option<DateTime<Utc>>,
	shutdown: Option<ShutdownReason>,
}

impl<B: Broker> Agent<B> {
	pub fn new(config: AgentConfig, broker: B) -> Result<Self, AgentError> {
		config.validate()?;
		let instruments = config.instrument_registry()?;
		let registry = config.series_registry()?;
		let strategies = config
			.strategies
			.iter()
			.cloned()
			.map(BreakoutStrategy::new)
			.collect::<Result<Vec<_>, _>>()?;
		let allocators = config
			.allocators
			.iter()
			.cloned()
			.map(|allocator| EqualWeightAllocator::new(allocator, &instruments))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			guardrails: config.agent.guardrails(),
			settings: config.agent,
			broker,
			instruments,
			registry,
			strategies,
			allocators,
			signals: SignalBook::new(),
			wait_policy: WaitPolicy::default(),
			orders: VecDeque::new(),
			summary: AgentSummary::default(),
			started_at: None,
			shutdown: None,
		})
	}

	pub fn broker(&self) -> &B {
		&self.broker
	}

	pub fn broker_mut(&mut self) -> &mut B {
		&mut self.broker
	}

	pub fn registry(&self) -> &BarSeriesRegistry {
		&self.registry
	}

	pub fn strategies(&self) -> &[BreakoutStrategy] {
		&self.strategies
	}

	pub fn allocators(&self) -> &[EqualWeightAllocator] {
		&self.allocators
	}

	pub fn signals(&self) -> &SignalBook {
		&self.signals
	}

	/// Recently submitted orders.
	pub fn orders(&self) -> &VecDeque<(OrderId, OrderIntent)> {
		&self.orders
	}

	pub fn summary(&self) -> AgentSummary {
		self.summary
	}

	pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
		self.shutdown
	}

	/// Connects, builds every bar series and runs one strategy and
	/// allocation pass. A failure runs the cleanup sequence before returning.
	pub fn start(&mut self) -> Result<(), AgentError> {
		if let Err(error) = self.try_start() {
			tracing::error!(error = %error, kind = error.kind(), "agent startup failed");
			self.shutdown(ShutdownReason::Error);
			return Err(error);
		}
		Ok(())
	}

	fn try_start(&mut self) -> Result<(), AgentError> {
		self.broker.connect()?;
		let started_at = self.broker.current_time()?;
		self.started_at = Some(started_at);
		tracing::info!(
			started_at = %started_at,
			series = self.registry.len(),
			strategies = self.strategies.len(),
			allocators = self.allocators.len(),
			"agent starting"
		);

		let now = self.buffer()?;
		self.registry.initialize(&mut self.broker, &self.instruments, now)?;
		self.step(now)?;
		Ok(())
	}

	/// Runs one pass. Only constraint failures are skipped; anything else is
	/// fatal and the caller is expected to shut down.
	pub fn run_cycle(&mut self, stop: &StopFlag) -> CycleOutcome {
		match self.try_cycle(stop) {
			Ok(None) => CycleOutcome::Interrupted,
			Ok(Some((signals, orders))) => {
				self.summary.cycles += 1;
				self.summary.signals += signals;
				self.summary.orders += orders;
				CycleOutcome::Completed { signals, orders }
			}
			Err(error) if error.is_cycle_recoverable() => {
				tracing::warn!(error = %error, "cycle skipped");
				self.summary.cycles += 1;
				self.summary.skipped += 1;
				CycleOutcome::Skipped(error.to_string())
			}
			Err(error) => {
				tracing::error!(error = %error, kind = error.kind(), "cycle failed");
				CycleOutcome::Fatal(error)
			}
		}
	}

	fn try_cycle(&mut self, stop: &StopFlag) -> Result<Option<(usize, usize)>, AgentError> {
		let cycle_start = self.broker.current_time()?;
		if !self.maintain_connection(cycle_start, stop)? {
			return Ok(None);
		}
		self.maintain_streaming()?;
		self.guardrails.check(&self.broker)?;

		let now = self.buffer()?;
		self.registry.refresh(now);
		self.step(now).map(Some)
	}

	/// Waits out a disconnection, failing once it outlasts one loop interval.
	/// Returns false when `stop` is raised before the venue comes back.
	fn maintain_connection(&mut self, cycle_start: DateTime<Utc>, stop: &StopFlag) -> Result<bool, AgentError> {
		let limit = self.settings.loop_interval.as_duration();
		let mut attempt = 0;
		while !self.broker.is_connected() {
			if stop.is_raised() {
				tracing::info!(attempt, "interrupt received while waiting for venue connectivity");
				return Ok(false);
			}
			let outage = self.broker.current_time()? - cycle_start;
			if outage > limit {
				return Err(AgentError::Connectivity(format!(
					"venue unreachable for {}s (limit {})",
					outage.num_seconds(),
					self.settings.loop_interval
				)));
			}
			attempt += 1;
			let wait = self.wait_policy.delay(attempt);
			tracing::warn!(attempt, wait_secs = wait.num_seconds(), "waiting for venue connectivity");
			self.broker.wait_on_update(wait);
		}
		Ok(true)
	}

	fn maintain_streaming(&mut self) -> Result<(), AgentError> {
		if !self.broker.connection().needs_resubscription() || !self.broker.is_connected() {
			return Ok(());
		}
		let now = self.broker.current_time()?;
		tracing::info!(now = %now, "resubscribing market data");
		self.registry.reset(&mut self.broker, &self.instruments, now, true)?;
		self.broker.connection().clear_resubscription();
		Ok(())
	}

	/// Bars close on the minute; give the venue `buffer_time` past it before
	/// reading them.
	fn buffer(&mut self) -> Result<DateTime<Utc>, AgentError> {
		let now = self.broker.current_time()?;
		let second = i64::from(now.second());
		let buffer = self.settings.buffer_time.as_seconds();
		if second < buffer {
			self.broker.sleep(Duration::seconds(buffer - second));
			return self.broker.current_time();
		}
		Ok(now)
	}

	fn step(&mut self, now: DateTime<Utc>) -> Result<(usize, usize), AgentError> {
		let mut published = 0;
		for strategy in &mut self.strategies {
			let update = strategy.update(&self.registry, now, &mut self.signals)?;
			published += update.published;
		}

		let mut submitted = 0;
		for allocator in &mut self.allocators {
			let pending = self.signals.take_tagged(allocator.id());
			let outcome = match allocator.allocate(&pending, &self.broker, &self.registry, &self.instruments, now) {
				Ok(outcome) => outcome,
				Err(error) => {
					self.signals.discard(pending);
					return Err(error);
				}
			};
			for intent in outcome.orders() {
				let order_id = self.broker.submit_order(intent)?;
				push_bounded(&mut self.orders, (order_id, intent.clone()), HISTORY_LEN);
				submitted += 1;
			}
		}
		Ok((published, submitted))
	}

	/// Runs until `stop` is raised, `max_cycles` passes complete or `run_for`
	/// elapses. A fatal cycle shuts down and returns its error.
	pub fn run(&mut self, stop: &StopFlag) -> Result<AgentSummary, AgentError> {
		if self.started_at.is_none() {
			self.start()?;
		}
		let started_at = self.started_at.unwrap_or_default();
		let run_for = self.settings.run_for.as_duration();

		loop {
			if stop.is_raised() {
				tracing::info!("interrupt received");
				break;
			}
			if self.settings.max_cycles.is_some_and(|max| self.summary.cycles >= max) {
				break;
			}

			let cycle_start = match self.broker.current_time() {
				Ok(now) => now,
				Err(error) => {
					self.shutdown(ShutdownReason::Error);
					return Err(error);
				}
			};
			if cycle_start - started_at >= run_for {
				tracing::info!(run_for = %self.settings.run_for, "run time elapsed");
				break;
			}

			match self.run_cycle(stop) {
				CycleOutcome::Completed { signals, orders } => {
					tracing::debug!(signals, orders, cycle = self.summary.cycles, "cycle completed");
				}
				CycleOutcome::Skipped(reason) => {
					tracing::debug!(reason = %reason, "cycle skipped");
				}
				CycleOutcome::Interrupted => break,
				CycleOutcome::Fatal(error) => {
					self.shutdown(ShutdownReason::Error);
					return Err(error);
				}
			}

			self.wait_next(cycle_start, stop);
		}

		self.shutdown(ShutdownReason::Interrupt);
		Ok(self.summary)
	}

	/// Sleeps until the next interval boundary in `sleep_time` steps so an
	/// interrupt is noticed promptly.
	fn wait_next(&mut self, cycle_start: DateTime<Utc>, stop: &StopFlag) {
		let interval = self.settings.loop_interval.as_duration();
		let next = floor_to(cycle_start, interval) + interval;
		let step = self.settings.sleep_time.as_duration().max(Duration::seconds(1));
		while !stop.is_raised() {
			let Ok(now) = self.broker.current_time() else {
				return;
			};
			if now >= next {
				return;
			}
			self.broker.wait_on_update(step.min(next - now));
		}
	}

	/// Cancels orders and data requests, pauses, then disconnects on error or
	/// as configured on interrupt. Runs at most once.
	pub fn shutdown(&mut self, reason: ShutdownReason) {
		if self.shutdown.is_some() {
			return;
		}
		self.shutdown = Some(reason);
		tracing::info!(reason = ?reason, "agent shutting down");

		match self.broker.cancel_all_open_orders() {
			Ok(cancelled) => tracing::info!(cancelled, "open orders cancelled"),
			Err(error) => tracing::warn!(error = %error, "cancel open orders failed"),
		}
		let cancelled = self.registry.cancel_all(&mut self.broker);
		tracing::info!(cancelled, "data subscriptions cancelled");
		self.broker.sleep(self.settings.sleep_time.as_duration());

		let disconnect = match reason {
			ShutdownReason::Error => true,
			ShutdownReason::Interrupt => self.settings.ending_process == EndingProcess::Disconnect,
		};
		if disconnect {
			self.broker.disconnect();
		}
	}
}
