use std::fmt;

pub const USER_ID_STORAGE_KEY: &str = "communityTreeUserId";
pub const ANONYMOUS_USER_ID: &str = "anonymous";
pub const USER_ID_PREFIX: &str = "user_";

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_USER_ID.to_string())
    }

    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_USER_ID
    }

    /// Leading characters shown in the panel footer.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Persistent string storage for the client identity.
pub trait IdentityStorage {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: &str) -> Result<(), String>;
}

/// `user_<ms>_<9 base-36 chars>`; `random` yields values in `[0, 1)`.
pub fn generate_user_id(now_ms: i64, mut random: impl FnMut() -> f64) -> UserId {
    let mut suffix = String::with_capacity(SUFFIX_LEN);
    for _ in 0..SUFFIX_LEN {
        let sample = random().clamp(0.0, 1.0);
        let idx = ((sample * BASE36.len() as f64) as usize).min(BASE36.len() - 1);
        suffix.push(BASE36[idx] as char);
    }
    UserId(format!("{USER_ID_PREFIX}{now_ms}_{suffix}"))
}

pub fn get_or_create_user_id<S>(
    storage: Option<&S>,
    now_ms: i64,
    random: impl FnMut() -> f64,
) -> Result<UserId, String>
where
    S: IdentityStorage + ?Sized,
{
    let Some(storage) = storage else {
        return Ok(UserId::anonymous());
    };
    if let Some(existing) = storage.load(USER_ID_STORAGE_KEY) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(UserId(trimmed.to_string()));
        }
    }
    let user_id = generate_user_id(now_ms, random);
    storage.store(USER_ID_STORAGE_KEY, user_id.as_str())?;
    Ok(user_id)
}
