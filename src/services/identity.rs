use async_trait::async_trait;

/// The signed-in user, as far as the colorization service needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
}

/// Source of the bearer credential and user metadata attached to requests.
///
/// Sign-in and token refresh live behind this trait; the client only asks for
/// whatever is current at request time.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn bearer_credential(&self) -> Option<String>;

    async fn current_user(&self) -> Option<UserIdentity>;
}

/// Identity fixed at startup (e.g., from configuration).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    token: Option<String>,
    user: Option<UserIdentity>,
}

impl StaticIdentity {
    pub fn new(token: Option<String>, user_id: Option<String>, email: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        let user = user_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| UserIdentity {
                id,
                email: email.filter(|e| !e.trim().is_empty()),
            });
        Self { token, user }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn bearer_credential(&self) -> Option<String> {
        self.token.clone()
    }

    async fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }
}

/// No credential and no user; requests go out unauthenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    async fn bearer_credential(&self) -> Option<String> {
        None
    }

    async fn current_user(&self) -> Option<UserIdentity> {
        None
    }
}
