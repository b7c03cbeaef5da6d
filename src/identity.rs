use std::cell::RefCell;

use communitree_core::identity::{get_or_create_user_id, IdentityStorage};
use communitree_core::UserId;
use js_sys::{Date, Math};
use web_sys::Storage;

struct LocalStorageIdentity(Storage);

impl IdentityStorage for LocalStorageIdentity {
    fn load(&self, key: &str) -> Option<String> {
        self.0.get_item(key).ok().flatten()
    }

    fn store(&self, key: &str, value: &str) -> Result<(), String> {
        self.0
            .set_item(key, value)
            .map_err(|err| format!("failed to store user id: {err:?}"))
    }
}

thread_local! {
    static USER_ID_CACHE: RefCell<Option<UserId>> = RefCell::new(None);
}

fn local_storage() -> Option<Storage> {
    let window = web_sys::window()?;
    window.local_storage().ok()?
}

/// The id this browser uses for every ornament it saves.
pub(crate) fn client_user_id() -> UserId {
    if let Some(cached) = USER_ID_CACHE.with(|cache| cache.borrow().clone()) {
        return cached;
    }
    let storage = local_storage().map(LocalStorageIdentity);
    let user_id = match get_or_create_user_id(storage.as_ref(), Date::now() as i64, Math::random) {
        Ok(user_id) => user_id,
        Err(err) => {
            gloo::console::warn!("identity", err);
            UserId::anonymous()
        }
    };
    if user_id.is_anonymous() {
        gloo::console::warn!("identity: localStorage unavailable, using anonymous");
    }
    USER_ID_CACHE.with(|cache| *cache.borrow_mut() = Some(user_id.clone()));
    user_id
}
