use crate::error::KrbError;
use crate::proto::{DerivedKey, EncryptionType, Name};
use crate::store::{MemoryPrincipalStore, PrincipalRecord};
use serde::Deserialize;
use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::error;

fn default_kvno() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UserPrincipal {
    pub name: String,
    pub password: String,
    #[serde(default = "default_kvno")]
    pub kvno: u32,
}

#[derive(Debug, Deserialize)]
pub struct ServicePrincipal {
    pub hostname: String,
    pub srvname: String,
    pub password: String,
    #[serde(default = "default_kvno")]
    pub kvno: u32,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub realm: String,
    #[serde(deserialize_with = "hex::serde::deserialize")]
    pub primary_key: Vec<u8>,
    #[serde(default)]
    pub user: Vec<UserPrincipal>,
    #[serde(default)]
    pub service: Vec<ServicePrincipal>,

    // Policy toggles. Everything an option needs still has to be earned
    // on the presented ticket; these are the server-side vetoes.
    #[serde(default = "default_true")]
    pub allow_forwardable: bool,
    #[serde(default = "default_true")]
    pub allow_proxiable: bool,
    #[serde(default = "default_true")]
    pub allow_postdate: bool,
    #[serde(default = "default_true")]
    pub allow_renewable: bool,
    #[serde(default)]
    pub allow_empty_addresses: bool,
    #[serde(default = "default_true")]
    pub verify_body_checksum: bool,
}

impl Config {
    pub fn parse<P: AsRef<Path>>(path: P) -> io::Result<Config> {
        let mut contents = String::new();
        let mut f = fs::File::open(&path)?;
        f.read_to_string(&mut contents)?;

        toml::from_str(&contents).map_err(|err| {
            error!(?err);
            io::Error::other("toml parse failure")
        })
    }
}

/// The immutable per-process view of server policy the pipeline consumes.
#[derive(Debug, Clone)]
pub struct KdcPolicy {
    pub realm: String,
    pub maximum_clock_skew: Duration,
    pub maximum_ticket_lifetime: Duration,
    pub maximum_renewable_lifetime: Duration,
    /// Acceptable encryption types, in server preference order.
    pub etypes: Vec<EncryptionType>,
    pub allow_forwardable: bool,
    pub allow_proxiable: bool,
    pub allow_postdate: bool,
    pub allow_renewable: bool,
    pub allow_empty_addresses: bool,
    pub verify_body_checksum: bool,
}

#[derive(Debug)]
pub struct ServerState {
    pub policy: KdcPolicy,
    pub store: MemoryPrincipalStore,
}

impl TryFrom<&Config> for ServerState {
    type Error = KrbError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        use crate::constants::PBKDF2_SHA1_ITER;

        let realm = config.realm.clone();

        let mut store = MemoryPrincipalStore::new();

        // The KDC's own ticket granting service principal, keyed by the
        // provisioned primary key.
        let primary_key = DerivedKey::from_raw_aes256(config.primary_key.as_slice(), 1)?;
        store.insert(
            Name::service_krbtgt(&realm),
            PrincipalRecord::new_service(primary_key),
        );

        for UserPrincipal {
            name,
            password,
            kvno,
        } in &config.user
        {
            let salt = format!("{realm}{name}");
            let base_key =
                DerivedKey::new_aes256_cts_hmac_sha1_96(password, &salt, PBKDF2_SHA1_ITER, *kvno)?;
            store.insert(
                Name::principal(name, &realm),
                PrincipalRecord::new_user(base_key),
            );
        }

        for ServicePrincipal {
            hostname,
            srvname,
            password,
            kvno,
        } in &config.service
        {
            let salt = format!("{realm}{srvname}/{hostname}");
            let base_key =
                DerivedKey::new_aes256_cts_hmac_sha1_96(password, &salt, PBKDF2_SHA1_ITER, *kvno)?;
            store.insert(
                Name::service(srvname, hostname, &realm),
                PrincipalRecord::new_service(base_key),
            );
        }

        // Tolerate five minutes of drift, the conventional figure.
        let maximum_clock_skew = Duration::from_secs(300);

        // Service tickets need to be long lived because almost nothing
        // renews them gracefully when they expire mid-session. Renewal of
        // the TGT itself is cheap, so that window can be generous too.
        let maximum_ticket_lifetime = Duration::from_secs(3600 * 8);
        let maximum_renewable_lifetime = Duration::from_secs(86400 * 7);

        let policy = KdcPolicy {
            realm,
            maximum_clock_skew,
            maximum_ticket_lifetime,
            maximum_renewable_lifetime,
            etypes: vec![EncryptionType::AES256_CTS_HMAC_SHA1_96],
            allow_forwardable: config.allow_forwardable,
            allow_proxiable: config.allow_proxiable,
            allow_postdate: config.allow_postdate,
            allow_renewable: config.allow_renewable,
            allow_empty_addresses: config.allow_empty_addresses,
            verify_body_checksum: config.verify_body_checksum,
        };

        Ok(ServerState { policy, store })
    }
}
