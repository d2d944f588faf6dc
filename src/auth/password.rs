use crate::error::AppError;

/// Salted bcrypt hashing with a server-side pepper appended to every password.
pub struct PasswordHasher {
    pepper: String,
    cost: u32,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<String>, cost: u32) -> Self {
        Self {
            pepper: pepper.into(),
            cost,
        }
    }

    fn peppered(&self, password: &str) -> String {
        format!("{}{}", password, self.pepper)
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        Ok(bcrypt::hash(self.peppered(password), self.cost)?)
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        Ok(bcrypt::verify(self.peppered(password), hash)?)
    }
}
