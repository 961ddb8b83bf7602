//! Engine lifecycle state machine.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Starting,
    /// No trading for the configured warm-up window.
    Warming,
    Running,
    /// Quoting continues defensively: wider, smaller, inner layers only.
    Degraded,
    /// Cancel-all issued; nothing new until restart.
    KillSwitch,
}

impl EnginePhase {
    /// Numeric code for gauges.
    pub fn code(self) -> i64 {
        match self {
            EnginePhase::Starting => 0,
            EnginePhase::Warming => 1,
            EnginePhase::Running => 2,
            EnginePhase::Degraded => 3,
            EnginePhase::KillSwitch => 4,
        }
    }
}

/// Health inputs evaluated on every transition check.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub quality: f64,
    pub usage_pct: f64,
    pub usage_safe_pct: f64,
    pub kill_triggered: bool,
}

pub struct EngineState {
    phase: EnginePhase,
    warmup_ms: u64,
    started_ms: Option<u64>,
}

impl EngineState {
    pub fn new(warmup_s: u64) -> Self {
        Self { phase: EnginePhase::Starting, warmup_ms: warmup_s * 1000, started_ms: None }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Begin warming. First call wins.
    pub fn start(&mut self, now_ms: u64) {
        if self.started_ms.is_none() {
            self.started_ms = Some(now_ms);
            self.phase = EnginePhase::Warming;
            info!(warmup_ms = self.warmup_ms, "engine warming up");
        }
    }

    /// Evaluate transitions. Returns the phase after the update.
    pub fn update(&mut self, now_ms: u64, health: HealthInputs) -> EnginePhase {
        if health.kill_triggered {
            if self.phase != EnginePhase::KillSwitch {
                warn!("engine entering kill-switch phase");
            }
            self.phase = EnginePhase::KillSwitch;
            return self.phase;
        }

        match self.phase {
            EnginePhase::Starting => {}
            EnginePhase::KillSwitch => {}
            EnginePhase::Warming => {
                if let Some(started) = self.started_ms {
                    if now_ms.saturating_sub(started) >= self.warmup_ms {
                        self.phase = EnginePhase::Running;
                        info!("warm-up complete, engine running");
                    }
                }
            }
            EnginePhase::Running => {
                if health.quality < 0.5 || health.usage_pct > health.usage_safe_pct {
                    self.phase = EnginePhase::Degraded;
                    warn!(
                        quality = health.quality,
                        usage = health.usage_pct,
                        "engine degraded"
                    );
                }
            }
            EnginePhase::Degraded => {
                if health.quality >= 0.5 && health.usage_pct <= health.usage_safe_pct {
                    self.phase = EnginePhase::Running;
                    info!("engine recovered from degraded mode");
                }
            }
        }
        self.phase
    }

    /// Whether new orders may be planned at all.
    pub fn can_quote(&self) -> bool {
        matches!(self.phase, EnginePhase::Running | EnginePhase::Degraded)
    }

    pub fn is_degraded(&self) -> bool {
        self.phase == EnginePhase::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> HealthInputs {
        HealthInputs { quality: 1.0, usage_pct: 5.0, usage_safe_pct: 15.0, kill_triggered: false }
    }

    #[test]
    fn warms_up_then_runs() {
        let mut s = EngineState::new(5);
        assert_eq!(s.phase(), EnginePhase::Starting);
        s.start(1000);
        assert_eq!(s.phase(), EnginePhase::Warming);
        assert!(!s.can_quote());

        assert_eq!(s.update(4999, healthy()), EnginePhase::Warming);
        assert_eq!(s.update(6000, healthy()), EnginePhase::Running);
        assert!(s.can_quote());
    }

    #[test]
    fn degrades_on_low_quality_and_recovers() {
        let mut s = EngineState::new(0);
        s.start(0);
        s.update(0, healthy());

        let mut bad = healthy();
        bad.quality = 0.4;
        assert_eq!(s.update(1, bad), EnginePhase::Degraded);
        assert!(s.can_quote());
        assert!(s.is_degraded());

        assert_eq!(s.update(2, healthy()), EnginePhase::Running);
    }

    #[test]
    fn degrades_on_hot_usage() {
        let mut s = EngineState::new(0);
        s.start(0);
        s.update(0, healthy());

        let mut hot = healthy();
        hot.usage_pct = 16.0;
        assert_eq!(s.update(1, hot), EnginePhase::Degraded);
    }

    #[test]
    fn kill_switch_is_terminal() {
        let mut s = EngineState::new(0);
        s.start(0);
        let mut kill = healthy();
        kill.kill_triggered = true;
        assert_eq!(s.update(1, kill), EnginePhase::KillSwitch);
        assert_eq!(s.update(2, healthy()), EnginePhase::KillSwitch);
        assert!(!s.can_quote());
    }
}
