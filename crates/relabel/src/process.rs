use md5::{Digest, Md5};

use crate::config::{Action, RelabelConfig};
use crate::labels::LabelSet;

/// Applies `configs` to `labels` in order.
///
/// Returns `None` when a `keep` or `drop` rule discards the label set.
pub fn process(labels: &LabelSet, configs: &[RelabelConfig]) -> Option<LabelSet> {
    let mut out = labels.clone();
    for config in configs {
        out = relabel(out, config)?;
    }
    Some(out)
}

/// Label names follow the Prometheus data model: `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn relabel(mut labels: LabelSet, config: &RelabelConfig) -> Option<LabelSet> {
    let value = config
        .source_labels
        .iter()
        .map(|name| labels.get(name).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(&config.separator);

    match config.action {
        Action::Drop => {
            if config.regex.is_match(&value) {
                return None;
            }
        }
        Action::Keep => {
            if !config.regex.is_match(&value) {
                return None;
            }
        }
        Action::Replace => {
            let Some(captures) = config.regex.regex().captures(&value) else {
                return Some(labels);
            };
            let Some(target_template) = config.target_label.as_deref() else {
                return Some(labels);
            };
            let mut target = String::new();
            captures.expand(target_template, &mut target);
            if !is_valid_label_name(&target) {
                return Some(labels);
            }
            let mut replaced = String::new();
            captures.expand(&config.replacement, &mut replaced);
            if replaced.is_empty() {
                labels.remove(&target);
            } else {
                labels.insert(target, replaced);
            }
        }
        Action::Lowercase => {
            if let Some(target) = &config.target_label {
                labels.insert(target.clone(), value.to_lowercase());
            }
        }
        Action::Uppercase => {
            if let Some(target) = &config.target_label {
                labels.insert(target.clone(), value.to_uppercase());
            }
        }
        Action::HashMod => {
            if let Some(target) = &config.target_label {
                // Low 8 bytes of the MD5 sum, big-endian, as Prometheus does.
                let digest = Md5::digest(value.as_bytes());
                let mut low = [0u8; 8];
                low.copy_from_slice(&digest[8..]);
                let modulus = config.modulus.max(1);
                labels.insert(target.clone(), (u64::from_be_bytes(low) % modulus).to_string());
            }
        }
        Action::LabelMap => {
            let mapped: Vec<(String, String)> = labels
                .iter()
                .filter(|(name, _)| config.regex.is_match(name))
                .map(|(name, value)| {
                    let renamed = config
                        .regex
                        .regex()
                        .replace_all(name, config.replacement.as_str())
                        .into_owned();
                    (renamed, value.to_string())
                })
                .collect();
            for (name, value) in mapped {
                labels.insert(name, value);
            }
        }
        Action::LabelDrop => labels.retain(|name, _| !config.regex.is_match(name)),
        Action::LabelKeep => labels.retain(|name, _| config.regex.is_match(name)),
    }

    Some(labels)
}
