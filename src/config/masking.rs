//! # Log Masking
//!
//! Redaction rules applied to operation parameters before they reach the
//! log stream. Per-operation rules mask whole fields (`data` on writes);
//! key-material fields are masked globally wherever they appear.

use std::collections::HashMap;

use serde_json::Value;

use crate::constants::MASK_PLACEHOLDER;

#[derive(Debug, Clone)]
pub struct MaskingRules {
    /// Operation name -> top-level fields to mask.
    rules: HashMap<String, Vec<String>>,
    /// Fields masked at any depth, regardless of operation.
    global: Vec<String>,
}

impl Default for MaskingRules {
    fn default() -> Self {
        let mut rules: HashMap<String, Vec<String>> = HashMap::new();
        for operation in [
            "Secret.create",
            "Secret.update_data",
            "TrustedSecret.create",
            "TrustedSecret.update_data",
            "UserSecret.create",
            "UserSecret.update_data",
        ] {
            rules.insert(operation.to_string(), vec!["data".to_string()]);
        }
        MaskingRules {
            rules,
            global: vec![
                "encrypt_data_key".to_string(),
                "trusted_encrypted_data_key".to_string(),
            ],
        }
    }
}

impl MaskingRules {
    /// Redacted copy of `params` for the given operation.
    pub fn apply(&self, operation: &str, params: &Value) -> Value {
        let mut masked = params.clone();
        if let Some(fields) = self.rules.get(operation) {
            if let Value::Object(map) = &mut masked {
                for field in fields {
                    if map.contains_key(field) {
                        map.insert(field.clone(), Value::String(MASK_PLACEHOLDER.into()));
                    }
                }
            }
        }
        self.mask_global(&mut masked);
        masked
    }

    fn mask_global(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if self.global.iter().any(|g| g == key) {
                        *child = Value::String(MASK_PLACEHOLDER.into());
                    } else {
                        self.mask_global(child);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.mask_global(item);
                }
            }
            _ => {}
        }
    }
}
