/// What the clients need to set the Authorization header
#[derive(Debug, Clone)]
pub enum AuthHeader {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl AuthHeader {
    /// Build the auth header from optional CLI credentials: a token wins,
    /// then username/password, then unauthenticated.
    pub fn from_credentials(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Option<Self> {
        if let Some(token) = token {
            return Some(Self::Bearer { token });
        }
        match (username, password) {
            (Some(username), Some(password)) => Some(Self::Basic { username, password }),
            _ => None,
        }
    }

    pub fn apply(auth: &Option<Self>, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match auth {
            Some(Self::Basic { username, password }) => req.basic_auth(username, Some(password)),
            Some(Self::Bearer { token }) => req.bearer_auth(token),
            None => req,
        }
    }
}
