//! Session provider seam.
//!
//! Authentication itself lives outside this crate; the sync core only needs
//! to know who the current user is and whether anyone is signed in.

use parking_lot::RwLock;
use uuid::Uuid;

pub trait SessionProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user_id(&self) -> Option<Uuid>;

    fn is_logged_in(&self) -> bool {
        self.current_user_id().is_some()
    }
}

/// Session whose user is set explicitly by the embedding application.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<Uuid>>,
}

impl StaticSession {
    #[must_use]
    pub fn signed_in(user_id: Uuid) -> Self {
        Self {
            user: RwLock::new(Some(user_id)),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: Uuid) {
        *self.user.write() = Some(user_id);
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<Uuid> {
        *self.user.read()
    }
}
