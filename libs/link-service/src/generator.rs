use rand::Rng;

use shortener_api::ALPHABET;

/// Случайный код длины `length` из reader-friendly алфавита.
/// Уникальность не гарантируется: см. `ExistenceOracle`.
pub fn generate(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
