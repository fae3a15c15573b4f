//! Random short code generation with collision retry.
//!
//! Each position first picks one of three character classes (digits, uppercase,
//! lowercase) with equal probability, then a uniform character inside the class.
//! Digits therefore appear more often than under a flat 62-character draw.

use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;
use crate::shortener::{UrlStore, DEFAULT_CODE_LENGTH};

pub const ALPHABET_SIZE: usize = 62;

const CHAR_CLASSES: [(u8, u8); 3] = [(b'0', 10), (b'A', 26), (b'a', 26)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeGenerator {
    length: usize,
}

impl CodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        (0..self.length)
            .map(|_| {
                let (start, span) = CHAR_CLASSES[rng.random_range(0..CHAR_CLASSES.len())];
                char::from(start + rng.random_range(0..span))
            })
            .collect()
    }

    /// Stores `original` under a fresh code and returns the code.
    ///
    /// Codes already taken are regenerated. A full store ends the loop with
    /// its capacity error.
    pub fn shorten(&self, store: &dyn UrlStore, original: &str) -> Result<String> {
        let mut rng = rand::rng();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let code = self.generate(&mut rng);

            match store.add_mapping(original, &code) {
                Ok(true) => debug!(code = %code, attempts, "Short code collision, retrying"),
                Ok(false) => return Ok(code),
                Err(e) => {
                    warn!(error = %e, attempts, "Unable to store short code");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use crate::shortener::{InMemoryUrlStore, ShortenerConfig};
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use std::time::Duration;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Reports a collision for the first `collisions` inserts, then accepts.
    struct ScriptedStore {
        collisions: usize,
        calls: AtomicUsize,
        full: bool,
        stored: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedStore {
        fn new(collisions: usize, full: bool) -> Self {
            Self {
                collisions,
                calls: AtomicUsize::new(0),
                full,
                stored: Mutex::new(Vec::new()),
            }
        }
    }

    impl UrlStore for ScriptedStore {
        fn add_mapping(&self, original: &str, code: &str) -> Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.full {
                return Err(GateError::CapacityExceeded("Url map is full".into()));
            }
            if call < self.collisions {
                return Ok(true);
            }
            self.stored
                .lock()
                .unwrap()
                .push((code.to_string(), original.to_string()));
            Ok(false)
        }

        fn retrieve_url(&self, code: &str) -> Result<String> {
            self.stored
                .lock()
                .unwrap()
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, url)| url.clone())
                .ok_or_else(|| GateError::NotFound(code.to_string()))
        }

        fn remove_mapping(&self, _code: &str) -> Result<()> {
            Ok(())
        }

        fn sweep(&self) -> Result<usize> {
            Ok(0)
        }

        fn offline(&self) {}

        fn is_offline(&self) -> bool {
            false
        }

        fn len(&self) -> usize {
            self.stored.lock().unwrap().len()
        }

        fn cap(&self) -> usize {
            usize::MAX
        }
    }

    #[test]
    fn test_generated_code_shape() {
        let generator = CodeGenerator::new(10);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let code = generator.generate(&mut rng);
            assert_eq!(code.len(), 10);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_character_classes_are_equally_likely() {
        let generator = CodeGenerator::new(30_000);
        let mut rng = StdRng::seed_from_u64(42);
        let code = generator.generate(&mut rng);

        let digits = code.chars().filter(char::is_ascii_digit).count() as f64;
        let upper = code.chars().filter(char::is_ascii_uppercase).count() as f64;
        let share = digits / code.len() as f64;

        // A flat draw over 62 characters would give digits about 16%.
        assert!((0.31..0.36).contains(&share), "digit share {}", share);
        assert!((0.31..0.36).contains(&(upper / code.len() as f64)));
    }

    #[test]
    fn test_shorten_retries_on_collision() {
        let store = ScriptedStore::new(3, false);
        let code = CodeGenerator::new(6)
            .shorten(&store, "https://example.com")
            .unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
        assert_eq!(code.len(), 6);
        assert_eq!(store.retrieve_url(&code).unwrap(), "https://example.com");
    }

    #[test]
    fn test_shorten_stops_when_store_is_full() {
        let store = ScriptedStore::new(0, true);
        let result = CodeGenerator::default().shorten(&store, "https://example.com");

        assert!(matches!(result, Err(GateError::CapacityExceeded(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_store_ends_retry_loop() {
        // 62 single-character codes, ten slots.
        let config = ShortenerConfig::new(10, Duration::from_secs(60), 1)
            .with_minimums(1, Duration::from_secs(1));
        let store = InMemoryUrlStore::new(config).unwrap();
        let generator = CodeGenerator::new(1);

        let codes: HashSet<String> = (0..10)
            .map(|i| {
                generator
                    .shorten(&store, &format!("https://example.com/{}", i))
                    .unwrap()
            })
            .collect();
        assert_eq!(codes.len(), 10);
        assert_eq!(store.len(), 10);

        // Drawing a taken code retries; drawing a free one reports the full store.
        for _ in 0..20 {
            let result = generator.shorten(&store, "https://example.com/late");
            assert!(matches!(result, Err(GateError::CapacityExceeded(_))));
        }
        assert_eq!(store.len(), 10);
        for code in &codes {
            assert!(store.retrieve_url(code).unwrap().starts_with("https://example.com/"));
        }
    }
}
