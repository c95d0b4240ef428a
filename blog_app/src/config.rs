use std::net::SocketAddr;

#[derive(clap::Parser)]
pub struct Config {
    /// Postgres connection string. Without it, comments are kept in memory.
    #[arg(long, env)]
    pub database_url: Option<String>,

    #[arg(long, env)]
    pub jwt_signing_key: JwtSigningKey,

    #[arg(long, env, default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,
}

#[derive(Clone)]
pub struct JwtSigningKey(pub hmac::Hmac<sha2::Sha384>);

impl std::str::FromStr for JwtSigningKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use hmac::Mac;

        Ok(Self(
            hmac::Hmac::<sha2::Sha384>::new_from_slice(s.as_bytes())
                .map_err(|e| format!("Failed to parse hmac: {e:?}"))?,
        ))
    }
}

