//! Externally supplied plugin catalog and hosted plugin units

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{AudioEffect, EffectKind, EffectParam};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to read plugin catalog: {0}")]
    CatalogRead(#[from] std::io::Error),
    #[error("Failed to parse plugin catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),
    #[error("Plugin not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Instrument,
    Effect,
}

/// Typed parameter descriptor; hosted units clamp against these ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginParamSpec {
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginPreset {
    pub name: String,
    #[serde(default)]
    pub values: HashMap<String, f32>,
}

/// Read-only catalog entry describing one hostable plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub kind: PluginKind,
    #[serde(default)]
    pub presets: Vec<PluginPreset>,
    /// Reported processing latency in samples
    #[serde(default)]
    pub latency_samples: usize,
    #[serde(default)]
    pub params: Vec<PluginParamSpec>,
}

/// Catalog of hostable plugins, supplied externally (typically a JSON
/// file produced by a separate scanner process).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginCatalog {
    pub plugins: Vec<PluginDescriptor>,
}

impl PluginCatalog {
    pub fn new(plugins: Vec<PluginDescriptor>) -> Self {
        Self { plugins }
    }

    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let data = std::fs::read_to_string(path)?;
        let catalog: Self = serde_json::from_str(&data)?;
        info!(path = %path.display(), count = catalog.plugins.len(), "Loaded plugin catalog");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// A hosted plugin instantiated from a catalog descriptor.
///
/// The plugin's own DSP runs out of process; inside the engine the unit
/// models its reported latency as a delay line and keeps its parameter
/// values clamped to the descriptor ranges.
#[derive(Debug)]
pub struct HostedPluginEffect {
    descriptor: PluginDescriptor,
    values: Vec<f32>,
    preset: Option<String>,
    latency_line: Vec<f32>,
    write_pos: usize,
    enabled: bool,
}

impl HostedPluginEffect {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        let values = descriptor.params.iter().map(|p| p.default).collect();
        let latency_line = vec![0.0; descriptor.latency_samples];
        Self {
            descriptor,
            values,
            preset: None,
            latency_line,
            write_pos: 0,
            enabled: true,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn preset(&self) -> Option<&str> {
        self.preset.as_deref()
    }
}

impl AudioEffect for HostedPluginEffect {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn kind(&self) -> EffectKind {
        EffectKind::HostedPlugin
    }

    fn process(&mut self, samples: &mut [f32]) {
        if self.latency_line.is_empty() {
            return;
        }
        for sample in samples.iter_mut() {
            let delayed = self.latency_line[self.write_pos];
            self.latency_line[self.write_pos] = *sample;
            self.write_pos = (self.write_pos + 1) % self.latency_line.len();
            *sample = delayed;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let Some(idx) = self.descriptor.params.iter().position(|p| p.name == name) else {
            return;
        };
        let spec = &self.descriptor.params[idx];
        self.values[idx] = value.clamp(spec.min, spec.max);
    }

    fn get_params(&self) -> Vec<EffectParam> {
        self.descriptor
            .params
            .iter()
            .zip(&self.values)
            .map(|(spec, &value)| EffectParam::new(&spec.name, value, spec.min, spec.max, ""))
            .collect()
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn reset(&mut self) {
        self.latency_line.fill(0.0);
        self.write_pos = 0;
    }

    /// Apply a named preset, resetting parameters to the preset values
    /// (clamped); unknown presets leave the unit untouched.
    fn set_preset(&mut self, name: &str) -> bool {
        let Some(preset) = self.descriptor.presets.iter().find(|p| p.name == name) else {
            return false;
        };
        for (spec, value) in self.descriptor.params.iter().zip(self.values.iter_mut()) {
            if let Some(&v) = preset.values.get(&spec.name) {
                *value = v.clamp(spec.min, spec.max);
            }
        }
        self.preset = Some(name.to_string());
        true
    }
}
