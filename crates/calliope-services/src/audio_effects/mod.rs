//! Audio effect units and chains

mod native;
pub mod plugins;

pub use native::{CompressorEffect, DelayEffect, DistortionEffect, EqEffect, ReverbEffect};
pub use plugins::{HostedPluginEffect, PluginCatalog, PluginDescriptor, PluginError, PluginKind, PluginParamSpec, PluginPreset};

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Effect unit type, also the wire name used by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Eq,
    Compressor,
    Reverb,
    Delay,
    Distortion,
    HostedPlugin,
}

/// Audio effect that can process mono samples in-place.
///
/// Stateless transforms (EQ, distortion) depend only on the current
/// buffer; stateful ones (reverb tail, delay feedback, compressor
/// envelope) carry hidden state across consecutive buffers of the same
/// track and clear it on `reset`.
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &str;
    fn kind(&self) -> EffectKind;
    fn process(&mut self, samples: &mut [f32]);
    /// Set a parameter by name; out-of-range values are clamped, never
    /// rejected
    fn set_param(&mut self, name: &str, value: f32);
    fn get_params(&self) -> Vec<EffectParam>;
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Update sample rate for effects that depend on it
    fn set_sample_rate(&mut self, _sample_rate: f32) {}
    /// Clear tails and envelopes carried between buffers
    fn reset(&mut self) {}
    /// Apply a named preset; only hosted plugins have presets
    fn set_preset(&mut self, _name: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectParam {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub unit: String,
}

impl EffectParam {
    pub fn new(name: &str, value: f32, min: f32, max: f32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            unit: unit.to_string(),
        }
    }
}

/// Serializable description of one chain slot, used in snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDescription {
    pub name: String,
    pub kind: EffectKind,
    pub enabled: bool,
    pub params: Vec<EffectParam>,
}

/// Build a native effect unit of the given kind. Hosted plugins are
/// created from catalog descriptors instead.
pub fn create_effect(kind: EffectKind, sample_rate: f32) -> Option<Box<dyn AudioEffect>> {
    match kind {
        EffectKind::Eq => Some(Box::new(EqEffect::new(sample_rate))),
        EffectKind::Compressor => Some(Box::new(CompressorEffect::new(sample_rate))),
        EffectKind::Reverb => Some(Box::new(ReverbEffect::new(0.5, 0.5, 0.3, sample_rate))),
        EffectKind::Delay => Some(Box::new(DelayEffect::new(0.25, 0.4, 0.3, sample_rate))),
        EffectKind::Distortion => Some(Box::new(DistortionEffect::new(2.0, 0.5))),
        EffectKind::HostedPlugin => None,
    }
}

/// Chain of effect units processed in list order; disabled units are
/// skipped entirely.
#[derive(Debug, Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn AudioEffect>>,
    bypass_all: bool,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Box<dyn AudioEffect>) -> usize {
        self.effects.push(effect);
        self.effects.len() - 1
    }

    pub fn remove(&mut self, slot: usize) -> Option<Box<dyn AudioEffect>> {
        if slot >= self.effects.len() {
            return None;
        }
        Some(self.effects.remove(slot))
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        if self.bypass_all {
            return;
        }
        for effect in &mut self.effects {
            if effect.is_enabled() {
                effect.process(samples);
            }
        }
    }

    pub fn set_param(&mut self, slot: usize, name: &str, value: f32) -> bool {
        let Some(effect) = self.effects.get_mut(slot) else {
            return false;
        };
        effect.set_param(name, value);
        true
    }

    pub fn set_enabled(&mut self, slot: usize, enabled: bool) -> bool {
        let Some(effect) = self.effects.get_mut(slot) else {
            return false;
        };
        effect.set_enabled(enabled);
        true
    }

    /// Whether `name` is a parameter of the unit in `slot`
    pub fn has_param(&self, slot: usize, name: &str) -> bool {
        self.effects
            .get(slot)
            .is_some_and(|e| e.get_params().iter().any(|p| p.name == name))
    }

    /// Current (post-clamp) value of a unit parameter
    pub fn param_value(&self, slot: usize, name: &str) -> Option<f32> {
        self.effects
            .get(slot)?
            .get_params()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    pub fn set_preset(&mut self, slot: usize, name: &str) -> bool {
        self.effects
            .get_mut(slot)
            .is_some_and(|e| e.set_preset(name))
    }

    pub fn get(&self, slot: usize) -> Option<&dyn AudioEffect> {
        self.effects.get(slot).map(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Box<dyn AudioEffect>> {
        self.effects.get_mut(slot)
    }

    pub fn set_bypass_all(&mut self, bypass: bool) {
        self.bypass_all = bypass;
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        for effect in &mut self.effects {
            effect.set_sample_rate(sample_rate);
        }
    }

    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }

    pub fn describe(&self) -> Vec<EffectDescription> {
        self.effects
            .iter()
            .map(|e| EffectDescription {
                name: e.name().to_string(),
                kind: e.kind(),
                enabled: e.is_enabled(),
                params: e.get_params(),
            })
            .collect()
    }
}

/// Two identical mono chains driving the left and right sides of the
/// master bus. Structural edits and parameter writes fan out to both so
/// the sides never drift apart.
#[derive(Debug, Default)]
pub struct StereoChain {
    left: EffectChain,
    right: EffectChain,
}

impl StereoChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kind(&mut self, kind: EffectKind, sample_rate: f32) -> Option<usize> {
        let left = create_effect(kind, sample_rate)?;
        let right = create_effect(kind, sample_rate)?;
        self.left.add(left);
        Some(self.right.add(right))
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        let removed = self.left.remove(slot).is_some();
        self.right.remove(slot);
        removed
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.left.process(left);
        self.right.process(right);
    }

    pub fn set_param(&mut self, slot: usize, name: &str, value: f32) -> bool {
        let ok = self.left.set_param(slot, name, value);
        self.right.set_param(slot, name, value);
        ok
    }

    pub fn set_enabled(&mut self, slot: usize, enabled: bool) -> bool {
        let ok = self.left.set_enabled(slot, enabled);
        self.right.set_enabled(slot, enabled);
        ok
    }

    pub fn param_value(&self, slot: usize, name: &str) -> Option<f32> {
        self.left.param_value(slot, name)
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    pub fn describe(&self) -> Vec<EffectDescription> {
        self.left.describe()
    }
}
