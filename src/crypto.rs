use crate::error::DecryptError;

/// Reverses the encryption applied to stored target passwords.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<String, DecryptError>;
}

/// For stores that keep passwords in clear text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl Decryptor for PlainText {
    fn decrypt(&self, ciphertext: &str) -> Result<String, DecryptError> {
        Ok(ciphertext.to_string())
    }
}

impl<F> Decryptor for F
where
    F: Fn(&str) -> Result<String, DecryptError> + Send + Sync,
{
    fn decrypt(&self, ciphertext: &str) -> Result<String, DecryptError> {
        self(ciphertext)
    }
}
