//! Detects an agent repeating the exact same tool call.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_DOOM_LOOP_THRESHOLD: usize = 3;

/// Sliding window over the most recent `(tool, args)` signatures.
#[derive(Debug, Clone)]
pub struct DoomLoopDetector {
    capacity: usize,
    window: VecDeque<(String, String)>,
}

impl Default for DoomLoopDetector {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DOOM_LOOP_THRESHOLD,
            window: VecDeque::with_capacity(DEFAULT_DOOM_LOOP_THRESHOLD),
        }
    }
}

impl DoomLoopDetector {
    pub fn new(capacity: usize) -> Result<Self, AppError> {
        if capacity < 2 {
            return Err(AppError::InvalidConfig {
                message: format!("doom-loop window must be at least 2, got {capacity}"),
            });
        }
        Ok(Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
        })
    }

    /// Record a call. Returns true when the window is full and every call
    /// in it has the same tool and arguments.
    pub fn check(&mut self, tool: &str, args: &Value) -> bool {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((tool.to_string(), stable_hash(args)));

        if self.window.len() < self.capacity {
            return false;
        }
        let mut entries = self.window.iter();
        match entries.next() {
            Some(first) => entries.all(|e| e == first),
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Calls currently held in the window.
    pub fn call_count(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Canonical JSON text: object keys sorted at every depth, arrays in order.
pub fn stable_hash(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_else(|_| value.to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_tiny_windows() {
        assert_eq!(DoomLoopDetector::new(1).unwrap_err().code(), "INVALID_CONFIG");
        assert!(DoomLoopDetector::new(2).is_ok());
        assert_eq!(DoomLoopDetector::default().capacity(), 3);
    }

    #[test]
    fn fires_on_identical_calls_only_when_full() {
        let mut d = DoomLoopDetector::default();
        let args = json!({ "clipId": "c1", "amount": 1.0 });
        assert!(!d.check("trim_clip", &args));
        assert!(!d.check("trim_clip", &args));
        assert!(d.check("trim_clip", &args));
        assert_eq!(d.call_count(), 3);
        // Still looping
        assert!(d.check("trim_clip", &args));
    }

    #[test]
    fn key_order_does_not_matter() {
        let mut d = DoomLoopDetector::new(2).unwrap();
        assert!(!d.check("move_clip", &json!({ "a": 1, "b": { "x": 1, "y": [1, 2] } })));
        assert!(d.check("move_clip", &json!({ "b": { "y": [1, 2], "x": 1 }, "a": 1 })));
    }

    #[test]
    fn array_order_and_tool_name_matter() {
        let mut d = DoomLoopDetector::new(2).unwrap();
        d.check("move_clip", &json!({ "ids": [1, 2] }));
        assert!(!d.check("move_clip", &json!({ "ids": [2, 1] })));

        d.reset();
        assert_eq!(d.call_count(), 0);
        d.check("move_clip", &json!({}));
        assert!(!d.check("split_clip", &json!({})));
    }

    #[test]
    fn different_call_breaks_the_streak() {
        let mut d = DoomLoopDetector::default();
        let same = json!({ "x": 1 });
        d.check("split_clip", &same);
        d.check("split_clip", &same);
        assert!(!d.check("split_clip", &json!({ "x": 2 })));
        assert!(!d.check("split_clip", &same));
    }
}
