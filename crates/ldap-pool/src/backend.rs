use crate::runtime::ContainerSpec;
use keycloak_admin::{ComponentRepresentation, LDAP_PROVIDER_ID};

/// Settings shared by every backend of a pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub image: String,
    /// Ownership label put on every container of the pool.
    pub label: String,
    /// Host port of backend 0; backend `i` listens on `base_port + i`.
    pub base_port: u16,
    /// Port OpenLDAP listens on inside the container.
    pub container_port: u16,
    /// Host name Keycloak uses to reach the published ports.
    pub host: String,
    pub base_dn: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            image: "bitnami/openldap:2.6.3".to_string(),
            label: "kc-reproducer".to_string(),
            base_port: 10389,
            container_port: 1389,
            host: "localhost".to_string(),
            base_dn: "dc=keycloak,dc=org".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "password".to_string(),
        }
    }
}

/// Seeded user account of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub username: String,
    pub password: String,
}

/// A provisioned directory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBackend {
    pub name: String,
    pub listen_port: u16,
    pub credentials: UserAccount,
    pub label: String,
    pub container_id: String,
}

impl DirectoryBackend {
    pub fn connection_url(&self, host: &str) -> String {
        format!("ldap://{host}:{}", self.listen_port)
    }
}

impl PoolSettings {
    pub fn backend_name(&self, port: u16) -> String {
        format!("ldap-{port}")
    }

    fn users_dn(&self) -> String {
        format!("ou=users,{}", self.base_dn)
    }

    fn bind_dn(&self) -> String {
        format!("cn={},{}", self.admin_username, self.base_dn)
    }

    /// Container spec of backend `index` listening on `port`.
    pub fn container_spec(&self, index: usize, port: u16) -> ContainerSpec {
        let account = format!("user{index}");
        let env = [
            ("LDAP_ROOT", self.base_dn.as_str()),
            ("LDAP_ADMIN_USERNAME", self.admin_username.as_str()),
            ("LDAP_ADMIN_PASSWORD", self.admin_password.as_str()),
            ("LDAP_USERS", account.as_str()),
            ("LDAP_PASSWORDS", account.as_str()),
            ("LDAP_USER_DC", "users"),
            ("LDAP_GROUP", "test"),
        ];
        ContainerSpec {
            image: self.image.clone(),
            name: self.backend_name(port),
            ports: vec![(port, self.container_port)],
            env: env
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            labels: vec![self.label.clone()],
        }
    }

    /// LDAP user federation component pointing at `backend`.
    pub fn component(&self, backend: &DirectoryBackend, parent_id: &str) -> ComponentRepresentation {
        let users_dn = self.users_dn();
        let bind_dn = self.bind_dn();
        let connection_url = backend.connection_url(&self.host);
        let config = [
            ("pagination", "true"),
            ("usersDn", users_dn.as_str()),
            ("connectionPooling", "true"),
            ("cachePolicy", "NONE"),
            ("importEnabled", "true"),
            ("enabled", "true"),
            ("usernameLDAPAttribute", "uid"),
            ("bindDn", bind_dn.as_str()),
            ("bindCredential", self.admin_password.as_str()),
            ("uuidLDAPAttribute", "uid"),
            ("authType", "simple"),
            ("userObjectClasses", "inetOrgPerson"),
            ("editMode", "READ_ONLY"),
            ("batchSizeForSync", "1000"),
            ("connectionUrl", connection_url.as_str()),
        ];
        ComponentRepresentation::user_storage(&backend.name, LDAP_PROVIDER_ID, parent_id, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(settings: &PoolSettings, port: u16) -> DirectoryBackend {
        DirectoryBackend {
            name: settings.backend_name(port),
            listen_port: port,
            credentials: UserAccount {
                username: "user0".to_string(),
                password: "user0".to_string(),
            },
            label: settings.label.clone(),
            container_id: "abc".to_string(),
        }
    }

    #[test]
    fn test_container_spec_seeds_indexed_user() {
        let settings = PoolSettings::default();
        let spec = settings.container_spec(3, 10392);
        assert_eq!(spec.name, "ldap-10392");
        assert_eq!(spec.ports, vec![(10392, 1389)]);
        assert!(spec
            .env
            .contains(&("LDAP_USERS".to_string(), "user3".to_string())));
        assert!(spec
            .env
            .contains(&("LDAP_PASSWORDS".to_string(), "user3".to_string())));
        assert_eq!(spec.labels, vec!["kc-reproducer".to_string()]);
    }

    #[test]
    fn test_component_points_at_backend() {
        let settings = PoolSettings::default();
        let component = settings.component(&backend(&settings, 10389), "realm-id");
        assert_eq!(component.name, "ldap-10389");
        assert_eq!(component.provider_id, "ldap");
        assert_eq!(component.parent_id.as_deref(), Some("realm-id"));
        assert_eq!(
            component.config_value("connectionUrl"),
            Some("ldap://localhost:10389")
        );
        assert_eq!(
            component.config_value("usersDn"),
            Some("ou=users,dc=keycloak,dc=org")
        );
        assert_eq!(
            component.config_value("bindDn"),
            Some("cn=admin,dc=keycloak,dc=org")
        );
        assert_eq!(component.config_value("editMode"), Some("READ_ONLY"));
    }
}
