use crate::application::clock::Clock;
use crate::domain::models::{
    decode_timer_config, decode_timer_state, duration_seconds, encode_timer_config,
    encode_timer_state, TimerConfig, TimerMode, TimerState,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{timer_settings_key, timer_state_key, KeyValueStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Unchanged,
    Advanced { remaining_seconds: u32 },
    /// The running interval hit zero; the timer is already stopped.
    ReachedZero { mode: TimerMode },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    pub mode: Option<TimerMode>,
    pub reset_streak: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub mode_label: String,
    pub remaining_seconds: u32,
    pub display: String,
    pub is_running: bool,
    pub focus_streak: u32,
    pub sessions_before_long_break: u32,
}

pub struct TimerStateMachine<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    clock: Clock,
    config: TimerConfig,
    state: TimerState,
}

impl<S> TimerStateMachine<S>
where
    S: KeyValueStore,
{
    pub fn load(store: Arc<S>, clock: Clock) -> Self {
        let config = load_config(&*store);
        let stored = load_state(&*store, &config);
        let state = recover_elapsed(stored, clock.now_ms());
        let machine = Self {
            store,
            clock,
            config,
            state,
        };
        machine.persist();
        machine
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn mode(&self) -> TimerMode {
        self.state.mode
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn duration_seconds(&self, mode: TimerMode) -> u32 {
        duration_seconds(Some(&self.config), mode)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            mode: self.state.mode,
            mode_label: self.state.mode.label().to_string(),
            remaining_seconds: self.state.remaining_seconds,
            display: format_seconds(self.state.remaining_seconds),
            is_running: self.state.is_running,
            focus_streak: self.state.focus_streak,
            sessions_before_long_break: self.config.sessions_before_long_break,
        }
    }

    /// Returns `false` when the timer was already running.
    pub fn start(&mut self) -> bool {
        if self.state.is_running {
            return false;
        }
        if self.state.remaining_seconds == 0 {
            self.state.remaining_seconds = self.duration_seconds(self.state.mode);
        }
        self.state.is_running = true;
        self.state.last_updated_at_ms = Some(self.clock.now_ms());
        self.persist();
        debug!(mode = self.state.mode.as_str(), remaining = self.state.remaining_seconds, "timer started");
        true
    }

    /// Returns `false` when the timer was not running.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_running {
            return false;
        }
        self.state.is_running = false;
        self.state.last_updated_at_ms = None;
        self.persist();
        debug!(remaining = self.state.remaining_seconds, "timer paused");
        true
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.state.is_running {
            return TickOutcome::Idle;
        }
        let now_ms = self.clock.now_ms();
        let last = self.state.last_updated_at_ms.unwrap_or(now_ms);
        let elapsed = elapsed_seconds(last, now_ms);
        if elapsed == 0 {
            return TickOutcome::Unchanged;
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(elapsed);
        if self.state.remaining_seconds == 0 {
            self.state.is_running = false;
            self.state.last_updated_at_ms = None;
            self.persist();
            return TickOutcome::ReachedZero {
                mode: self.state.mode,
            };
        }

        self.state.last_updated_at_ms = Some(now_ms);
        self.persist();
        TickOutcome::Advanced {
            remaining_seconds: self.state.remaining_seconds,
        }
    }

    /// Stops at 00:00 without reloading a duration; first step of a completion.
    pub fn halt_at_zero(&mut self) {
        self.state.is_running = false;
        self.state.remaining_seconds = 0;
        self.state.last_updated_at_ms = None;
        self.persist();
    }

    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.reset(ResetOptions {
            mode: Some(mode),
            reset_streak: false,
        });
    }

    /// Unrecognized names are ignored and leave the timer untouched.
    pub fn switch_mode_named(&mut self, raw: &str) -> bool {
        match TimerMode::parse(raw) {
            Some(mode) => {
                self.switch_mode(mode);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self, options: ResetOptions) {
        let mode = options.mode.unwrap_or(self.state.mode);
        self.state.mode = mode;
        self.state.remaining_seconds = self.duration_seconds(mode);
        self.state.is_running = false;
        self.state.last_updated_at_ms = None;
        if options.reset_streak {
            self.state.focus_streak = 0;
        }
        self.persist();
    }

    pub fn next_break_mode(&self) -> TimerMode {
        if self.state.focus_streak.saturating_add(1) >= self.config.sessions_before_long_break {
            TimerMode::LongBreak
        } else {
            TimerMode::ShortBreak
        }
    }

    /// Counts one finished focus interval and returns the break that follows it.
    pub fn record_focus_completion(&mut self) -> TimerMode {
        let next_mode = self.next_break_mode();
        self.state.focus_streak = match next_mode {
            TimerMode::LongBreak => 0,
            _ => self.state.focus_streak.saturating_add(1),
        };
        self.persist();
        next_mode
    }

    pub fn update_config(&mut self, config: TimerConfig) -> Result<(), InfraError> {
        config.validate().map_err(InfraError::InvalidInput)?;
        self.config = config;
        let payload = encode_timer_config(&self.config)?;
        if let Err(error) = self.store.set(&timer_settings_key(), &payload) {
            warn!(%error, "failed to persist timer settings");
        }
        self.reset(ResetOptions::default());
        Ok(())
    }

    /// In-memory defaults after the persisted keys were wiped.
    pub fn restore_defaults(&mut self) {
        self.config = TimerConfig::default();
        self.state = TimerState::initial(&self.config);
    }

    fn persist(&self) {
        let result = encode_timer_state(&self.state)
            .map_err(InfraError::from)
            .and_then(|payload| self.store.set(&timer_state_key(), &payload));
        if let Err(error) = result {
            warn!(%error, "failed to persist timer state");
        }
    }
}

/// Applies the time that passed while the process was away. Reaching zero here only
/// stops the timer; completion effects are reserved for a live tick.
pub fn recover_elapsed(mut state: TimerState, now_ms: i64) -> TimerState {
    let (true, Some(last)) = (state.is_running, state.last_updated_at_ms) else {
        return state;
    };
    let elapsed = elapsed_seconds(last, now_ms);
    state.remaining_seconds = state.remaining_seconds.saturating_sub(elapsed);
    if state.remaining_seconds == 0 {
        state.is_running = false;
        state.last_updated_at_ms = None;
    } else {
        state.last_updated_at_ms = Some(now_ms);
    }
    state
}

pub fn format_seconds(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn elapsed_seconds(last_ms: i64, now_ms: i64) -> u32 {
    let elapsed = now_ms.saturating_sub(last_ms).div_euclid(1000);
    elapsed.clamp(0, i64::from(u32::MAX)) as u32
}

fn load_config(store: &dyn KeyValueStore) -> TimerConfig {
    match store.get(&timer_settings_key()) {
        Ok(Some(raw)) => decode_timer_config(&raw).unwrap_or_else(|error| {
            warn!(%error, "discarding malformed timer settings");
            TimerConfig::default()
        }),
        Ok(None) => TimerConfig::default(),
        Err(error) => {
            warn!(%error, "failed to read timer settings");
            TimerConfig::default()
        }
    }
}

fn load_state(store: &dyn KeyValueStore, config: &TimerConfig) -> TimerState {
    match store.get(&timer_state_key()) {
        Ok(Some(raw)) => decode_timer_state(&raw, config).unwrap_or_else(|error| {
            warn!(%error, "discarding malformed timer state");
            TimerState::initial(config)
        }),
        Ok(None) => TimerState::initial(config),
        Err(error) => {
            warn!(%error, "failed to read timer state");
            TimerState::initial(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::test_support::ManualClock;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use proptest::prelude::*;

    fn machine(
        manual: &ManualClock,
    ) -> (Arc<InMemoryKeyValueStore>, TimerStateMachine<InMemoryKeyValueStore>) {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let machine = TimerStateMachine::load(Arc::clone(&store), manual.clock());
        (store, machine)
    }

    fn persist_running(store: &InMemoryKeyValueStore, remaining: u32, last_updated: i64) {
        let state = TimerState {
            mode: TimerMode::Focus,
            remaining_seconds: remaining,
            is_running: true,
            last_updated_at_ms: Some(last_updated),
            focus_streak: 1,
        };
        store
            .set(&timer_state_key(), &encode_timer_state(&state).expect("encode"))
            .expect("seed state");
    }

    #[test]
    fn first_load_starts_paused_in_focus_with_full_duration() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, machine) = machine(&manual);
        assert_eq!(machine.mode(), TimerMode::Focus);
        assert!(!machine.is_running());
        assert_eq!(machine.state().remaining_seconds, 1500);
        assert_eq!(machine.state().last_updated_at_ms, None);
    }

    #[test]
    fn start_and_pause_are_idempotent() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);

        assert!(machine.start());
        let started = machine.state().clone();
        manual.advance_ms(3_000);
        assert!(!machine.start());
        assert_eq!(machine.state(), &started);

        assert!(machine.pause());
        let paused = machine.state().clone();
        assert!(!machine.pause());
        assert_eq!(machine.state(), &paused);
        assert_eq!(paused.last_updated_at_ms, None);
    }

    #[test]
    fn tick_ignores_sub_second_jitter_and_counts_whole_seconds() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        machine.start();

        manual.advance_ms(900);
        assert_eq!(machine.tick(), TickOutcome::Unchanged);

        manual.advance_ms(1_300);
        assert_eq!(
            machine.tick(),
            TickOutcome::Advanced {
                remaining_seconds: 1498
            }
        );
        assert_eq!(machine.state().last_updated_at_ms, Some(manual.now_ms()));
    }

    #[test]
    fn tick_reaches_zero_once_and_stops() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        machine.start();

        manual.advance_ms(1_600_000);
        assert_eq!(
            machine.tick(),
            TickOutcome::ReachedZero {
                mode: TimerMode::Focus
            }
        );
        assert!(!machine.is_running());
        assert_eq!(machine.state().remaining_seconds, 0);

        manual.advance_ms(5_000);
        assert_eq!(machine.tick(), TickOutcome::Idle);
    }

    #[test]
    fn start_after_zero_reloads_full_duration() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        machine.switch_mode(TimerMode::ShortBreak);
        machine.halt_at_zero();
        machine.start();
        assert_eq!(machine.state().remaining_seconds, 300);
    }

    #[test]
    fn recovery_subtracts_elapsed_time_while_running() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let store = Arc::new(InMemoryKeyValueStore::default());
        persist_running(&store, 100, manual.now_ms());

        manual.advance_ms(40_000);
        let machine = TimerStateMachine::load(Arc::clone(&store), manual.clock());
        assert_eq!(machine.state().remaining_seconds, 60);
        assert!(machine.is_running());
        assert_eq!(machine.state().last_updated_at_ms, Some(manual.now_ms()));
    }

    #[test]
    fn recovery_past_zero_stops_without_completing() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let store = Arc::new(InMemoryKeyValueStore::default());
        persist_running(&store, 100, manual.now_ms());

        manual.advance_ms(120_000);
        let mut machine = TimerStateMachine::load(Arc::clone(&store), manual.clock());
        assert_eq!(machine.state().remaining_seconds, 0);
        assert!(!machine.is_running());
        assert_eq!(machine.state().focus_streak, 1);
        assert_eq!(machine.tick(), TickOutcome::Idle);
    }

    #[test]
    fn malformed_state_resets_only_timer_state() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let store = Arc::new(InMemoryKeyValueStore::default());
        let config = TimerConfig {
            focus_minutes: 50,
            ..TimerConfig::default()
        };
        store
            .set(&timer_settings_key(), &encode_timer_config(&config).expect("encode"))
            .expect("seed config");
        store.set(&timer_state_key(), "[1,2,3]").expect("seed state");

        let machine = TimerStateMachine::load(Arc::clone(&store), manual.clock());
        assert_eq!(machine.config().focus_minutes, 50);
        assert_eq!(machine.state().remaining_seconds, 3000);
    }

    #[test]
    fn switch_mode_stops_and_reloads_duration_but_keeps_streak() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        machine.record_focus_completion();
        machine.start();

        assert!(machine.switch_mode_named("longBreak"));
        assert_eq!(machine.mode(), TimerMode::LongBreak);
        assert_eq!(machine.state().remaining_seconds, 900);
        assert!(!machine.is_running());
        assert_eq!(machine.state().focus_streak, 1);

        assert!(!machine.switch_mode_named("siesta"));
        assert_eq!(machine.mode(), TimerMode::LongBreak);
    }

    #[test]
    fn reset_can_zero_the_streak() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        machine.record_focus_completion();
        machine.record_focus_completion();

        machine.reset(ResetOptions::default());
        assert_eq!(machine.state().focus_streak, 2);

        machine.reset(ResetOptions {
            mode: Some(TimerMode::ShortBreak),
            reset_streak: true,
        });
        assert_eq!(machine.state().focus_streak, 0);
        assert_eq!(machine.mode(), TimerMode::ShortBreak);
        assert_eq!(machine.state().remaining_seconds, 300);
    }

    #[test]
    fn streak_produces_long_break_every_threshold() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        let breaks = (0..4)
            .map(|_| machine.record_focus_completion())
            .collect::<Vec<_>>();
        assert_eq!(
            breaks,
            vec![
                TimerMode::ShortBreak,
                TimerMode::ShortBreak,
                TimerMode::ShortBreak,
                TimerMode::LongBreak
            ]
        );
        assert_eq!(machine.state().focus_streak, 0);
    }

    #[test]
    fn update_config_rejects_out_of_range_values_and_keeps_state() {
        let manual = ManualClock::at("2026-02-16T09:00:00Z");
        let (_store, mut machine) = machine(&manual);
        let invalid = TimerConfig {
            short_break_minutes: 61,
            ..TimerConfig::default()
        };
        assert!(matches!(
            machine.update_config(invalid),
            Err(InfraError::InvalidInput(_))
        ));
        assert_eq!(machine.config(), &TimerConfig::default());

        let valid = TimerConfig {
            focus_minutes: 45,
            ..TimerConfig::default()
        };
        machine.update_config(valid).expect("update");
        assert_eq!(machine.state().remaining_seconds, 2700);
    }

    #[test]
    fn format_seconds_pads_minutes_and_seconds() {
        assert_eq!(format_seconds(0), "00:00");
        assert_eq!(format_seconds(65), "01:05");
        assert_eq!(format_seconds(180 * 60), "180:00");
    }

    proptest! {
        #[test]
        fn recovery_never_underflows(
            remaining in 1u32..10_800u32,
            away_ms in 0i64..20_000_000i64
        ) {
            let state = TimerState {
                mode: TimerMode::Focus,
                remaining_seconds: remaining,
                is_running: true,
                last_updated_at_ms: Some(1_000_000),
                focus_streak: 0,
            };
            let recovered = recover_elapsed(state, 1_000_000 + away_ms);
            let expected = remaining.saturating_sub((away_ms / 1000) as u32);
            prop_assert_eq!(recovered.remaining_seconds, expected);
            prop_assert_eq!(recovered.is_running, expected > 0);
            prop_assert_eq!(recovered.last_updated_at_ms.is_some(), expected > 0);
        }
    }

    proptest! {
        #[test]
        fn long_break_follows_every_nth_focus(threshold in 1u32..=12u32, rounds in 1usize..40usize) {
            let manual = ManualClock::at("2026-02-16T09:00:00Z");
            let store = Arc::new(InMemoryKeyValueStore::default());
            let mut machine = TimerStateMachine::load(Arc::clone(&store), manual.clock());
            machine
                .update_config(TimerConfig {
                    sessions_before_long_break: threshold,
                    ..TimerConfig::default()
                })
                .expect("config");

            for index in 1..=rounds {
                let next = machine.record_focus_completion();
                let expect_long = index % threshold as usize == 0;
                prop_assert_eq!(next == TimerMode::LongBreak, expect_long);
                prop_assert!(machine.state().focus_streak < threshold);
            }
        }
    }
}
