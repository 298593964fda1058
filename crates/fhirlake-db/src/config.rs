/// Connection settings for the FHIR server's backing Postgres store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub pool_size: u32,
    /// Fixed pool floor. The downstream catalog driver mishandles pool
    /// shrink, so the pool never drops below this.
    pub min_connections: u32,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            pool_size: 10,
            min_connections: 3,
        }
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }
}
