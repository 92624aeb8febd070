// src/chat/models.rs — Free / premium partition and default model choice

use crate::sdk::ModelInfo;

/// Multipliers above this are premium requests.
const FREE_MULTIPLIER_MAX: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct ModelTiers<'a> {
    pub free: Vec<&'a ModelInfo>,
    pub premium: Vec<&'a ModelInfo>,
}

/// An explicit premium flag wins; otherwise the billing multiplier decides.
pub fn is_premium(model: &ModelInfo) -> bool {
    match model.billing {
        Some(ref billing) => billing
            .is_premium
            .unwrap_or(billing.multiplier > FREE_MULTIPLIER_MAX),
        None => false,
    }
}

/// Split models into tiers, preserving vendor order within each tier.
pub fn partition_models(models: &[ModelInfo]) -> ModelTiers<'_> {
    let (premium, free) = models.iter().partition(|m| is_premium(m));
    ModelTiers { free, premium }
}

/// Preferred id if it is offered and enabled, then the first enabled free
/// model, then the first enabled model, then whatever comes first.
pub fn default_model<'a>(models: &'a [ModelInfo], preferred: Option<&str>) -> Option<&'a ModelInfo> {
    if let Some(id) = preferred {
        if let Some(m) = models.iter().find(|m| m.id == id && m.is_enabled()) {
            return Some(m);
        }
    }
    models
        .iter()
        .find(|m| m.is_enabled() && !is_premium(m))
        .or_else(|| models.iter().find(|m| m.is_enabled()))
        .or_else(|| models.first())
}

/// Short tier label for lists: "free" or "premium ×10".
pub fn tier_label(model: &ModelInfo) -> String {
    if is_premium(model) {
        format!("premium ×{}", model.multiplier())
    } else {
        "free".into()
    }
}
