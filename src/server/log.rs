//! Operational message log
//!
//! A bounded ring of human-readable messages shown on `/log`. Every message
//! is also emitted through `tracing`.

use std::collections::VecDeque;

use chrono::Local;

/// Default number of messages kept
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct MessageLog {
    messages: VecDeque<String>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, evicting the oldest when full
    pub fn append(&mut self, program: Option<&str>, message: &str) {
        let now = Local::now().to_rfc2822();
        let line = match program {
            Some(program) => {
                tracing::info!(program = %program, "{}", message);
                format!("{}: {}: {}", now, program, message)
            }
            None => {
                tracing::info!("{}", message);
                format!("{}: {}", now, message)
            }
        };

        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(line);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Oldest first
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let mut log = MessageLog::default();
        log.append(Some("news"), "running");
        log.append(None, "config reloaded");

        let messages: Vec<&str> = log.messages().collect();
        assert!(messages[0].ends_with(": news: running"));
        assert!(messages[1].ends_with(": config reloaded"));
        // RFC 2822 timestamps carry a zone offset
        let stamp = messages[0].trim_end_matches(": news: running");
        assert!(chrono::DateTime::parse_from_rfc2822(stamp).is_ok());
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut log = MessageLog::new(3);
        for i in 0..5 {
            log.append(None, &format!("m{}", i));
        }

        let messages: Vec<&str> = log.messages().collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].ends_with("m2"));
        assert!(messages[2].ends_with("m4"));
    }

    #[test]
    fn test_shrink() {
        let mut log = MessageLog::new(5);
        for i in 0..5 {
            log.append(None, &format!("m{}", i));
        }
        log.set_capacity(2);
        assert_eq!(log.len(), 2);
        assert!(log.messages().next().unwrap().ends_with("m3"));
    }
}
