use crate::gate::ledger::Ordering;
use crate::gate::timer::PassPolicy;

pub const DESTINATION_URL: &str = "https://ks-script.github.io/KS.WEB/";
pub const SECRET_MARKER: &str = "KS2024SCRIPT";

/// Snapshots older than this are ignored on load.
pub const SNAPSHOT_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[cfg(debug_assertions)]
pub fn storage_key() -> &'static str {
    "ks_linkunlocker_data_dev"  // Keeps local testing away from real progress
}

#[cfg(not(debug_assertions))]
pub fn storage_key() -> &'static str {
    "ks_linkunlocker_data"
}

/// Which of the historical page layouts to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Three steps, every step needs a return to the tab, 10s spread.
    Classic,
    /// Three steps with an interaction floor; the last step is lenient, 5s spread.
    Refined,
    /// Subscribe + like only.
    TwoStep,
    /// Two independent buttons, no ordering and no presence check.
    Minimal,
}

impl Variant {
    pub fn from_query(value: &str) -> Option<Variant> {
        match value.trim().to_ascii_lowercase().as_str() {
            "classic" => Some(Variant::Classic),
            "refined" => Some(Variant::Refined),
            "two-step" | "twostep" => Some(Variant::TwoStep),
            "minimal" => Some(Variant::Minimal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepConfig {
    pub title: String,
    pub description: String,
    pub action_label: String,
    pub action_url: String,
    pub wait_secs: u32,
    pub policy: PassPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GateConfig {
    pub variant: Variant,
    pub steps: Vec<StepConfig>,
    pub ordering: Ordering,
    pub min_spread_ms: i64,
    pub focus_required: bool,
    pub destination_url: String,
    pub storage_key: String,
    pub secret: String,
    pub launch_grace_ms: u32,
    pub redirect_delay_ms: u32,
    pub snapshot_ttl_ms: i64,
}

fn subscribe_step(policy: PassPolicy) -> StepConfig {
    StepConfig {
        title: "Subscribe on YouTube".to_string(),
        description: "Subscribe to the channel, then come back to this tab.".to_string(),
        action_label: "Subscribe".to_string(),
        action_url: "https://www.youtube.com/@KS_SCRIPT_Owner?sub_confirmation=1".to_string(),
        wait_secs: 8,
        policy,
    }
}

fn like_step(policy: PassPolicy) -> StepConfig {
    StepConfig {
        title: "Like the video".to_string(),
        description: "Leave a like on the latest short.".to_string(),
        action_label: "Like".to_string(),
        action_url: "https://www.youtube.com/shorts/bGm4dt_Isrk".to_string(),
        wait_secs: 6,
        policy,
    }
}

fn discord_step(policy: PassPolicy) -> StepConfig {
    StepConfig {
        title: "Join the Discord".to_string(),
        description: "Join the community server.".to_string(),
        action_label: "Join".to_string(),
        action_url: "https://discord.com/channels/@me".to_string(),
        wait_secs: 10,
        policy,
    }
}

impl GateConfig {
    pub fn preset(variant: Variant) -> GateConfig {
        let interaction = PassPolicy::Interaction { min_interaction_ms: 3000 };
        let (steps, ordering, min_spread_ms) = match variant {
            Variant::Classic => (
                vec![
                    subscribe_step(PassPolicy::ReturnToTab),
                    like_step(PassPolicy::ReturnToTab),
                    discord_step(PassPolicy::ReturnToTab),
                ],
                Ordering::Sequential,
                10_000,
            ),
            Variant::Refined => (
                vec![
                    subscribe_step(interaction.clone()),
                    like_step(interaction),
                    discord_step(PassPolicy::Lenient),
                ],
                Ordering::Sequential,
                5_000,
            ),
            Variant::TwoStep => (
                vec![
                    subscribe_step(PassPolicy::ReturnToTab),
                    like_step(PassPolicy::ReturnToTab),
                ],
                Ordering::Sequential,
                5_000,
            ),
            Variant::Minimal => {
                let mut subscribe = subscribe_step(PassPolicy::Immediate);
                let mut like = like_step(PassPolicy::Immediate);
                subscribe.wait_secs = 3;
                like.wait_secs = 3;
                (vec![subscribe, like], Ordering::Independent, 0)
            }
        };

        GateConfig {
            variant,
            steps,
            ordering,
            min_spread_ms,
            focus_required: true,
            destination_url: DESTINATION_URL.to_string(),
            storage_key: storage_key().to_string(),
            secret: SECRET_MARKER.to_string(),
            launch_grace_ms: 500,
            redirect_delay_ms: 1500,
            snapshot_ttl_ms: SNAPSHOT_TTL_MS,
        }
    }

    pub fn total_steps(&self) -> u8 {
        self.steps.len() as u8
    }

    pub fn step(&self, index: u8) -> Option<&StepConfig> {
        if index == 0 {
            return None;
        }
        self.steps.get(index as usize - 1)
    }

    /// Policy actually applied to a step; turning off `focus_required`
    /// makes every step pass once its countdown runs out.
    pub fn effective_policy(&self, index: u8) -> Option<PassPolicy> {
        let step = self.step(index)?;
        if self.focus_required {
            Some(step.policy.clone())
        } else {
            Some(PassPolicy::Immediate)
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig::preset(Variant::Classic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_layouts() {
        let classic = GateConfig::preset(Variant::Classic);
        assert_eq!(classic.total_steps(), 3);
        assert_eq!(classic.min_spread_ms, 10_000);
        assert_eq!(classic.step(1).map(|s| s.wait_secs), Some(8));
        assert_eq!(classic.step(3).map(|s| s.wait_secs), Some(10));

        let refined = GateConfig::preset(Variant::Refined);
        assert_eq!(refined.min_spread_ms, 5_000);
        assert_eq!(refined.step(3).map(|s| s.policy.clone()), Some(PassPolicy::Lenient));

        let minimal = GateConfig::preset(Variant::Minimal);
        assert_eq!(minimal.total_steps(), 2);
        assert_eq!(minimal.ordering, Ordering::Independent);
    }

    #[test]
    fn step_lookup_is_one_based() {
        let config = GateConfig::default();
        assert!(config.step(0).is_none());
        assert!(config.step(4).is_none());
        assert_eq!(config.step(2).map(|s| s.title.as_str()), Some("Like the video"));
    }

    #[test]
    fn focus_not_required_downgrades_policy() {
        let mut config = GateConfig::default();
        config.focus_required = false;
        assert_eq!(config.effective_policy(1), Some(PassPolicy::Immediate));
        assert_eq!(config.effective_policy(9), None);
    }

    #[test]
    fn variant_from_query() {
        assert_eq!(Variant::from_query("Refined"), Some(Variant::Refined));
        assert_eq!(Variant::from_query("two-step"), Some(Variant::TwoStep));
        assert_eq!(Variant::from_query("bogus"), None);
    }
}
