//! Event fusion, deduplication, and alert prioritization.
//!
//! The orchestrator consumes the per-frame event batch from all agents and
//! turns it into a priority-ranked alert list. Rules are data: an ordered
//! table of condition sets mapping to alert levels, evaluated against the
//! deduplicated batch plus a short correlation buffer of recent events.

use std::collections::HashMap;

use tracing::info;

use crate::domain::{
    Alert, AlertLevel, BedAbsenceKind, Event, EventClass, EventPayload, FallType,
    ImmobilityRisk, LightBand, TrackId,
};
use crate::{MonitorError, Result};

/// One condition of a fusion rule.
#[derive(Debug, Clone)]
pub enum RuleCondition {
    /// An event of this class is present.
    Kind(EventClass),
    /// A fall event of this specific type is present.
    FallOfType(FallType),
    /// A vital-signs event with heart rate below the bound is present.
    HeartRateBelow(f64),
    /// The frame timestamp falls inside the configured night window.
    Nighttime,
}

impl RuleCondition {
    /// Whether this condition is satisfied by an event (as opposed to
    /// frame context).
    fn is_event_condition(&self) -> bool {
        !matches!(self, RuleCondition::Nighttime)
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            RuleCondition::Kind(class) => event.class() == *class,
            RuleCondition::FallOfType(wanted) => matches!(
                event.payload,
                EventPayload::FallDetected { fall_type, .. } if fall_type == *wanted
            ),
            RuleCondition::HeartRateBelow(bound) => matches!(
                event.payload,
                EventPayload::VitalSigns { heart_rate, .. } if heart_rate < *bound
            ),
            RuleCondition::Nighttime => false,
        }
    }
}

/// A declarative fusion rule: all conditions must hold on a single track
/// within the correlation window, with at least one satisfied by the
/// current batch.
#[derive(Debug, Clone)]
pub struct FusionRule {
    /// Stable rule name, used in logs and messages.
    pub name: &'static str,
    /// Conditions, all of which must be satisfied.
    pub conditions: Vec<RuleCondition>,
    /// Alert level the rule assigns. The emitted alert never drops below
    /// the primary event's intrinsic level.
    pub level: AlertLevel,
    /// Human-readable alert message.
    pub message: &'static str,
}

/// The default rule table.
pub fn default_rules() -> Vec<FusionRule> {
    vec![
        FusionRule {
            name: "confirmed_fall",
            conditions: vec![RuleCondition::FallOfType(FallType::Fall)],
            level: AlertLevel::Critical,
            message: "Fall detected",
        },
        FusionRule {
            name: "critical_fall",
            conditions: vec![
                RuleCondition::Kind(EventClass::Fall),
                RuleCondition::HeartRateBelow(50.0),
            ],
            level: AlertLevel::Critical,
            message: "Fall with bradycardia",
        },
        FusionRule {
            name: "bed_exit_night",
            conditions: vec![
                RuleCondition::Kind(EventClass::BedTransition),
                RuleCondition::Nighttime,
            ],
            level: AlertLevel::High,
            message: "Bed activity during night hours",
        },
        FusionRule {
            name: "prolonged_immobility",
            conditions: vec![RuleCondition::Kind(EventClass::Immobility)],
            level: AlertLevel::Medium,
            message: "Patient immobile for a prolonged period",
        },
        FusionRule {
            name: "seizure",
            conditions: vec![RuleCondition::Kind(EventClass::Seizure)],
            level: AlertLevel::Critical,
            message: "Possible seizure activity",
        },
    ]
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Rolling dedup window per (event class, track), seconds.
    pub dedup_window_secs: f64,
    /// How long past events stay eligible for multi-condition rules,
    /// seconds.
    pub correlation_window_secs: f64,
    /// First night hour, inclusive (0-23).
    pub night_start_hour: u32,
    /// First morning hour, exclusive (0-23).
    pub night_end_hour: u32,
    /// The rule table, evaluated in order.
    pub rules: Vec<FusionRule>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 2.0,
            correlation_window_secs: 2.0,
            night_start_hour: 22,
            night_end_hour: 6,
            rules: default_rules(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dedup_window_secs < 0.0 || self.correlation_window_secs < 0.0 {
            return Err(MonitorError::Config(
                "orchestrator windows must be non-negative".into(),
            ));
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            return Err(MonitorError::Config(
                "night hours must be within 0-23".into(),
            ));
        }
        Ok(())
    }
}

/// Intrinsic alert level of a lone event.
fn individual_level(event: &Event) -> AlertLevel {
    match &event.payload {
        EventPayload::FallDetected { fall_type, .. } => match fall_type {
            FallType::Fall | FallType::NearFall => AlertLevel::High,
            FallType::Lying => AlertLevel::Medium,
        },
        EventPayload::Seizure { .. } => AlertLevel::Critical,
        EventPayload::VitalSigns { .. } => AlertLevel::Info,
        EventPayload::Distress { .. } => AlertLevel::Info,
        EventPayload::BedTransition { .. } => AlertLevel::Medium,
        EventPayload::BedAbsence { kind, .. } => match kind {
            BedAbsenceKind::EmptyBedWarning => AlertLevel::Medium,
            BedAbsenceKind::EmptyBedCritical => AlertLevel::Critical,
            BedAbsenceKind::ExtendedAbsence => AlertLevel::High,
        },
        EventPayload::Immobility { risk, .. } => match risk {
            ImmobilityRisk::Medium => AlertLevel::Medium,
            ImmobilityRisk::High => AlertLevel::High,
        },
        EventPayload::LowLight { band, .. } => match band {
            LightBand::VeryDark => AlertLevel::High,
            LightBand::Dim => AlertLevel::Medium,
            LightBand::SlightlyDark => AlertLevel::Low,
        },
    }
}

fn describe(event: &Event) -> String {
    match &event.payload {
        EventPayload::FallDetected { fall_type, .. } => {
            format!("Fall indicator: {fall_type}")
        }
        EventPayload::Seizure { affected_limbs, .. } => {
            format!("Seizure pattern on {} limbs", affected_limbs.len())
        }
        EventPayload::VitalSigns { heart_rate, respiratory_rate, .. } => {
            format!("Vitals: HR {heart_rate:.0} bpm, RR {respiratory_rate:.0}/min")
        }
        EventPayload::Distress { emotion, .. } => {
            format!("Sustained distress: {emotion}")
        }
        EventPayload::BedTransition { state, .. } => {
            format!("Bed state changed to {state}")
        }
        EventPayload::BedAbsence { kind, absent_secs } => {
            let minutes = absent_secs / 60.0;
            match kind {
                BedAbsenceKind::EmptyBedWarning => {
                    format!("Bed empty for {minutes:.0} minutes")
                }
                BedAbsenceKind::EmptyBedCritical => {
                    format!("Bed still empty after {minutes:.0} minutes")
                }
                BedAbsenceKind::ExtendedAbsence => {
                    format!("Patient unobserved for {minutes:.0} minutes after leaving bed")
                }
            }
        }
        EventPayload::Immobility { duration_secs, .. } => {
            format!("No movement for {:.0} minutes", duration_secs / 60.0)
        }
        EventPayload::LowLight { brightness, .. } => {
            format!("Low room lighting (luma {brightness:.0})")
        }
    }
}

/// Fuses per-frame event batches into prioritized alerts.
pub struct Orchestrator {
    config: OrchestratorConfig,
    /// Highest confidence seen per (class, track) inside the dedup window.
    recent_by_key: HashMap<(EventClass, TrackId), (f64, f64)>,
    /// Events still inside the correlation window, for multi-condition
    /// rules.
    correlation: Vec<Event>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            recent_by_key: HashMap::new(),
            correlation: Vec::new(),
        })
    }

    /// Whether the stream timestamp falls in the configured night window.
    /// Timestamps are interpreted as seconds of day (wrapping).
    fn is_nighttime(&self, timestamp: f64) -> bool {
        let hour = ((timestamp / 3600.0).floor() as i64).rem_euclid(24) as u32;
        let (start, end) = (self.config.night_start_hour, self.config.night_end_hour);
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    /// Drop within-window duplicates, keeping the highest-confidence
    /// instance per (event class, track).
    fn deduplicate(&mut self, now: f64, batch: Vec<Event>) -> Vec<Event> {
        self.recent_by_key
            .retain(|_, (ts, _)| now - *ts <= self.config.dedup_window_secs);

        // Within the batch, the best instance per key wins.
        let mut best: HashMap<(EventClass, TrackId), Event> = HashMap::new();
        for event in batch {
            let key = (event.class(), event.track_id);
            match best.get(&key) {
                Some(kept) if kept.confidence.value() >= event.confidence.value() => {}
                _ => {
                    best.insert(key, event);
                }
            }
        }

        let mut fresh: Vec<Event> = Vec::new();
        for (key, event) in best {
            let confidence = event.confidence.value();
            match self.recent_by_key.get_mut(&key) {
                // Already alerted on this condition within the window. The
                // window runs from first sight so a periodic condition
                // resurfaces once it expires.
                Some((_, best_conf)) => {
                    *best_conf = best_conf.max(confidence);
                }
                None => {
                    self.recent_by_key.insert(key, (now, confidence));
                    fresh.push(event);
                }
            }
        }

        // Restore a total order after the HashMap pass.
        fresh.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.agent.priority_rank().cmp(&b.agent.priority_rank()))
                .then_with(|| a.track_id.cmp(&b.track_id))
                .then_with(|| a.frame_id.cmp(&b.frame_id))
        });
        fresh
    }

    /// Evaluate the rule table against the fresh events plus the
    /// correlation buffer. Returns the alerts and marks which fresh events
    /// were consumed.
    fn apply_rules(
        &self,
        timestamp: f64,
        fresh: &[Event],
        consumed: &mut [bool],
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for rule in &self.config.rules {
            if rule
                .conditions
                .iter()
                .any(|c| matches!(c, RuleCondition::Nighttime))
                && !self.is_nighttime(timestamp)
            {
                continue;
            }

            // A rule describes one incident on one person, so every event
            // condition must hold on the same track. Anchor tracks come
            // from the current batch: a rule fires only on new evidence.
            let mut anchors: Vec<TrackId> = fresh
                .iter()
                .filter(|e| {
                    rule.conditions
                        .iter()
                        .any(|c| c.is_event_condition() && c.matches(e))
                })
                .map(|e| e.track_id)
                .collect();
            anchors.sort_unstable();
            anchors.dedup();

            for anchor in anchors {
                // Each event condition must be satisfied on the anchor
                // track, preferring fresh events over buffered ones.
                let mut matched: Vec<(usize, Option<usize>)> = Vec::new();
                let mut satisfied = true;
                for (ci, condition) in rule.conditions.iter().enumerate() {
                    if !condition.is_event_condition() {
                        continue;
                    }
                    let from_fresh = fresh
                        .iter()
                        .position(|e| e.track_id == anchor && condition.matches(e));
                    if let Some(fi) = from_fresh {
                        matched.push((ci, Some(fi)));
                        continue;
                    }
                    let from_buffer = self
                        .correlation
                        .iter()
                        .position(|e| e.track_id == anchor && condition.matches(e));
                    if from_buffer.is_some() {
                        matched.push((ci, None));
                    } else {
                        satisfied = false;
                        break;
                    }
                }

                if !satisfied || matched.is_empty() {
                    continue;
                }

                let mut contributing: Vec<Event> = Vec::new();
                for (ci, fi) in &matched {
                    let event = match fi {
                        Some(fi) => {
                            consumed[*fi] = true;
                            fresh[*fi].clone()
                        }
                        None => {
                            let condition = &rule.conditions[*ci];
                            match self
                                .correlation
                                .iter()
                                .find(|e| e.track_id == anchor && condition.matches(e))
                            {
                                Some(event) => event.clone(),
                                None => continue,
                            }
                        }
                    };
                    if !contributing.contains(&event) {
                        contributing.push(event);
                    }
                }
                let Some(primary) = contributing.first().cloned() else {
                    continue;
                };
                let related = contributing[1..].to_vec();

                let level = rule.level.max(individual_level(&primary));
                info!(
                    rule = rule.name,
                    level = %level,
                    track_id = %primary.track_id,
                    "fusion rule matched"
                );
                alerts.push(
                    Alert::new(level, rule.message, primary).with_related(related),
                );
            }
        }

        alerts
    }

    /// Fuse one frame's event batch into a priority-ranked alert list.
    pub fn process_batch(&mut self, timestamp: f64, batch: Vec<Event>) -> Vec<Alert> {
        self.correlation
            .retain(|e| timestamp - e.timestamp <= self.config.correlation_window_secs);

        let fresh = self.deduplicate(timestamp, batch);
        let mut consumed = vec![false; fresh.len()];
        let mut alerts = self.apply_rules(timestamp, &fresh, &mut consumed);

        for (event, consumed) in fresh.iter().zip(&consumed) {
            if !consumed {
                let level = individual_level(event);
                alerts.push(Alert::new(level, describe(event), event.clone()));
            }
        }

        self.correlation.extend(fresh);

        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| a.timestamp.total_cmp(&b.timestamp))
                .then_with(|| {
                    a.primary_event
                        .agent
                        .priority_rank()
                        .cmp(&b.primary_event.agent.priority_rank())
                })
                .then_with(|| a.primary_event.track_id.cmp(&b.primary_event.track_id))
                .then_with(|| a.primary_event.frame_id.cmp(&b.primary_event.frame_id))
        });
        alerts
    }

    /// Drop all dedup and correlation state.
    pub fn reset(&mut self) {
        self.recent_by_key.clear();
        self.correlation.clear();
    }
}
