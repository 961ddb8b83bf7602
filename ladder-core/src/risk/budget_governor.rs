//! Message-budget governor.
//!
//! Three coupled loops set the 10-second budgets:
//!
//! 1. A closed-queue model: to keep `N*` orders resting with mean TTL `τ`,
//!    new orders must arrive at `λ = N*/τ`; reprice and cancel budgets
//!    follow the observed per-new ratios.
//! 2. A PID loop on API usage that scales all budgets toward the target
//!    band, with a hard wall at the safe ceiling.
//! 3. A KPI loop that penalizes messages which do not move on-book value.
//!
//! Budgets move at most ±3 per window so the executor never sees a cliff.

use crate::config::GovernorConfig;
use crate::core::Budgets;
use std::collections::VecDeque;
use tracing::debug;

/// Observed message counts in the last 10-second window.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgCounts {
    pub fill: u32,
    pub reprice: u32,
    pub cancel: u32,
}

impl MsgCounts {
    pub fn total(&self) -> u32 {
        self.fill + self.reprice + self.cancel
    }
}

/// Everything the governor consumes per step.
#[derive(Debug, Clone, Copy)]
pub struct GovernorInputs {
    /// Target resting orders per layer, both sides combined.
    pub n_l0: u32,
    pub n_l1: u32,
    pub n_l2: u32,
    /// Layer TTLs, seconds.
    pub ttl_l0_s: f64,
    pub ttl_l1_s: f64,
    pub ttl_l2_s: f64,
    pub msg_10s: MsgCounts,
    /// API usage over the last window, percent.
    pub usage_pct: f64,
    pub onbook_usd_now: f64,
    pub onbook_usd_10s_ago: f64,
    /// Signed inventory error feeding the side split.
    pub inventory_err: f64,
}

const EMA_MPD_ALPHA: f64 = 0.2;
const EMA_USAGE_ALPHA: f64 = 0.3;
const RAMP_STEP: i64 = 3;
const MSE_WINDOW: usize = 600;

fn ema(prev: Option<f64>, x: f64, alpha: f64) -> f64 {
    match prev {
        Some(p) => (1.0 - alpha) * p + alpha * x,
        None => x,
    }
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub struct BudgetGovernor {
    config: GovernorConfig,
    err_int: f64,
    prev_err: Option<f64>,
    ema_mpd: Option<f64>,
    ema_usage: Option<f64>,
    prev_budgets: Option<(u32, u32, u32)>,
    last_step_s: Option<f64>,
    tracking_errors: VecDeque<f64>,
}

impl BudgetGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            err_int: 0.0,
            prev_err: None,
            ema_mpd: None,
            ema_usage: None,
            prev_budgets: None,
            last_step_s: None,
            tracking_errors: VecDeque::with_capacity(MSE_WINDOW),
        }
    }

    /// τ weighted by per-layer concurrency, floored so λ stays finite.
    fn weighted_tau(inputs: &GovernorInputs) -> f64 {
        let n_total = (inputs.n_l0 + inputs.n_l1 + inputs.n_l2).max(1) as f64;
        let tau = (inputs.ttl_l0_s * inputs.n_l0 as f64
            + inputs.ttl_l1_s * inputs.n_l1 as f64
            + inputs.ttl_l2_s * inputs.n_l2 as f64)
            / n_total;
        tau.max(3.0)
    }

    /// Closed-queue-model base budgets.
    fn cqm_budgets(&self, inputs: &GovernorInputs) -> (f64, f64, f64) {
        let new_10s = inputs.msg_10s.fill;
        // Conservative priors until real traffic establishes the ratios.
        let (p_rep, p_can) = if new_10s <= 2 {
            (1.0, 2.0)
        } else {
            let p_rep = inputs.msg_10s.reprice as f64 / new_10s.max(1) as f64;
            let p_can = inputs.msg_10s.cancel as f64 / new_10s.max(1) as f64;
            (clamp(p_rep, 0.3, 2.0), clamp(p_can, 0.5, 4.0))
        };

        let n_target = (inputs.n_l0 + inputs.n_l1 + inputs.n_l2) as f64;
        let tau = Self::weighted_tau(inputs);
        let lam_need = n_target / tau;
        let base_new_10s = (10.0 * lam_need).ceil();

        (base_new_10s, (base_new_10s * p_rep).ceil(), (base_new_10s * p_can).ceil())
    }

    /// PID on usage. Returns a scale in [0.5, 1.5]; forced to at most 0.8
    /// once usage reaches the safe ceiling.
    fn usage_scale(&mut self, usage_pct: f64, dt: f64) -> f64 {
        self.ema_usage = Some(ema(self.ema_usage, usage_pct, EMA_USAGE_ALPHA));
        let e = self.ema_usage.unwrap_or(usage_pct) - self.config.usage_target_pct;

        self.err_int += e * dt;
        self.err_int = clamp(self.err_int, -self.config.integrator_limit, self.config.integrator_limit);

        let de = match self.prev_err {
            Some(prev) if dt > 0.0 => (e - prev) / dt,
            _ => 0.0,
        };
        self.prev_err = Some(e);

        let adj = -(self.config.kp * e + self.config.ki * self.err_int + self.config.kd * de);
        let mut scale = 1.0 + clamp(adj, -0.25, 0.25);

        if usage_pct >= self.config.usage_safe_pct {
            scale = scale.min(0.8);
        }

        if self.tracking_errors.len() == MSE_WINDOW {
            self.tracking_errors.pop_front();
        }
        self.tracking_errors.push_back(e * e);

        clamp(scale, 0.5, 1.5)
    }

    /// Messages per dollar of on-book change; inefficiency is taxed.
    fn kpi_scale(&mut self, inputs: &GovernorInputs) -> f64 {
        let msgs = inputs.msg_10s.total() as f64;
        let delta_onbook = (inputs.onbook_usd_now - inputs.onbook_usd_10s_ago).abs().max(1e-6);
        let mpd = msgs / delta_onbook;
        self.ema_mpd = Some(ema(self.ema_mpd, mpd, EMA_MPD_ALPHA));
        match self.ema_mpd.unwrap_or(mpd) {
            m if m <= 0.15 => 1.05,
            m if m <= 0.30 => 1.0,
            m if m <= 0.60 => 0.9,
            _ => 0.8,
        }
    }

    fn ramp(current: i64, previous: i64) -> i64 {
        if current > previous + RAMP_STEP {
            previous + RAMP_STEP
        } else if current < previous - RAMP_STEP {
            previous - RAMP_STEP
        } else {
            current
        }
    }

    /// One control step. `now_s` is any monotone clock in seconds.
    pub fn step(&mut self, now_s: f64, inputs: &GovernorInputs) -> Budgets {
        let dt = match self.last_step_s {
            Some(last) => (now_s - last).max(1e-3),
            None => 1.0,
        };
        self.last_step_s = Some(now_s);

        let (fill_f, rep_f, can_f) = self.cqm_budgets(inputs);

        let usage_scale = self.usage_scale(inputs.usage_pct, dt);
        let kpi_scale = self.kpi_scale(inputs);

        let mut fill = (fill_f * usage_scale * kpi_scale).round() as i64;
        let mut rep = (rep_f * usage_scale * kpi_scale).round() as i64;
        let mut can = (can_f * usage_scale).round() as i64;

        let prev = self.prev_budgets.unwrap_or((fill as u32, rep as u32, can as u32));
        fill = Self::ramp(fill, prev.0 as i64);
        rep = Self::ramp(rep, prev.1 as i64);
        can = Self::ramp(can, prev.2 as i64);

        let (min_f, min_r, min_c) = self.config.min_budgets;
        let (max_f, max_r, max_c) = self.config.max_budgets;
        let fill = (fill.max(min_f as i64).min(max_f as i64)) as u32;
        let rep = (rep.max(min_r as i64).min(max_r as i64)) as u32;
        let can = (can.max(min_c as i64).min(max_c as i64)) as u32;

        self.prev_budgets = Some((fill, rep, can));

        // TTL stretches when usage runs hot so orders churn less.
        let ttl_scale = clamp(
            1.0 + 0.5 * (self.config.usage_target_pct - inputs.usage_pct)
                / self.config.usage_target_pct.max(1.0),
            0.8,
            1.3,
        );

        let alpha = clamp(
            sigmoid(self.config.side_split_gamma * inputs.inventory_err),
            0.35,
            0.65,
        );
        let fill_buy = ((alpha * fill as f64).round() as u32).clamp(1, fill.max(1));
        let fill_sell = fill.saturating_sub(fill_buy).max(1);

        debug!(
            fill, rep, can, usage_scale, kpi_scale, alpha,
            "governor step"
        );

        Budgets {
            fill_10s: fill,
            reprice_10s: rep,
            cancel_10s: can,
            burst_fill: fill,
            burst_reprice: rep,
            burst_cancel: can,
            ttl_scale,
            fill_10s_buy: fill_buy,
            fill_10s_sell: fill_sell,
            alpha,
        }
    }

    /// Mean squared usage tracking error over the sample window.
    pub fn tracking_mse(&self) -> Option<f64> {
        if self.tracking_errors.is_empty() {
            return None;
        }
        Some(self.tracking_errors.iter().sum::<f64>() / self.tracking_errors.len() as f64)
    }

    pub fn integrator(&self) -> f64 {
        self.err_int
    }

    /// Restore the integrator from a checkpoint.
    pub fn restore_integrator(&mut self, value: f64) {
        self.err_int = clamp(value, -self.config.integrator_limit, self.config.integrator_limit);
    }

    /// EMA state (usage, messages-per-delta) for checkpointing.
    pub fn ema_stats(&self) -> (Option<f64>, Option<f64>) {
        (self.ema_usage, self.ema_mpd)
    }

    pub fn restore_ema_stats(&mut self, ema_usage: Option<f64>, ema_mpd: Option<f64>) {
        self.ema_usage = ema_usage;
        self.ema_mpd = ema_mpd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profiles;
    use rust_decimal_macros::dec;

    fn governor() -> BudgetGovernor {
        BudgetGovernor::new(profiles::default_profile("DOGEUSDT", dec!(1000)).governor)
    }

    fn inputs(usage: f64) -> GovernorInputs {
        GovernorInputs {
            n_l0: 4,
            n_l1: 4,
            n_l2: 2,
            ttl_l0_s: 2.0,
            ttl_l1_s: 8.0,
            ttl_l2_s: 20.0,
            msg_10s: MsgCounts { fill: 6, reprice: 6, cancel: 12 },
            usage_pct: usage,
            onbook_usd_now: 200.0,
            onbook_usd_10s_ago: 100.0,
            inventory_err: 0.0,
        }
    }

    #[test]
    fn budgets_respect_configured_bounds() {
        let mut g = governor();
        let b = g.step(0.0, &inputs(10.0));
        assert!((2..=20).contains(&b.fill_10s));
        assert!((2..=20).contains(&b.reprice_10s));
        assert!((20..=80).contains(&b.cancel_10s));
    }

    #[test]
    fn safety_wall_at_safe_usage() {
        let mut g = governor();
        // Establish a baseline then spike usage to the safe ceiling.
        let calm = g.step(0.0, &inputs(10.0));
        let hot = g.step(10.0, &inputs(15.0));
        assert!(hot.fill_10s <= calm.fill_10s);
    }

    #[test]
    fn side_split_is_bounded_and_leans_toward_deficit() {
        let mut g = governor();
        let mut inp = inputs(10.0);
        inp.inventory_err = 5.0; // badly short of base
        let b = g.step(0.0, &inp);
        assert!((0.35..=0.65).contains(&b.alpha));
        assert!(b.alpha > 0.5);
        assert!(b.fill_10s_buy >= b.fill_10s_sell);
        assert_eq!(b.fill_10s_buy + b.fill_10s_sell, b.fill_10s.max(2));
    }

    #[test]
    fn integrator_stays_bounded_under_constant_error() {
        let mut g = governor();
        for i in 0..1000 {
            let _ = g.step(i as f64, &inputs(30.0));
        }
        assert!(g.integrator().abs() <= 50.0 + 1e-9);
    }

    #[test]
    fn tracking_error_decays_toward_target() {
        let mut g = governor();
        // Plant: usage proportional to the fill budget. Crude, but enough
        // to verify the loop pulls usage into the band.
        let mut usage = 30.0;
        for i in 0..700 {
            let b = g.step(i as f64, &inputs(usage));
            usage = b.fill_10s as f64 * 1.0;
        }
        let mse = g.tracking_mse().expect("samples collected");
        assert!(mse < 4.0, "usage MSE {} should settle below 4", mse);
    }

    #[test]
    fn ttl_scale_inversely_tracks_usage() {
        let mut g = governor();
        let idle = g.step(0.0, &inputs(2.0));
        let mut g2 = governor();
        let hot = g2.step(0.0, &inputs(20.0));
        assert!(idle.ttl_scale > 1.0);
        assert!(hot.ttl_scale < 1.0);
        assert!((0.8..=1.3).contains(&hot.ttl_scale));
        assert!((0.8..=1.3).contains(&idle.ttl_scale));
    }

    #[test]
    fn budgets_ramp_gradually() {
        let mut g = governor();
        let first = g.step(0.0, &inputs(10.0));
        let mut inp = inputs(10.0);
        // Demand far more concurrency; budgets may only move by the ramp.
        inp.n_l0 = 40;
        inp.n_l1 = 40;
        let second = g.step(10.0, &inp);
        assert!(second.fill_10s <= first.fill_10s + 3);
    }
}
