//! MongoDB-backed schema store.
//!
//! # Responsibility
//! - Build driver options from `ConnectionSettings`.
//! - Translate driver errors into `StoreError` categories.
//!
//! # Invariants
//! - Connection-level driver failures map to `StoreError::Unreachable`.
//! - Dropping the client in `close` releases its connection pool.

use super::{Connector, SchemaStore, StoreError, StoreResult};
use crate::config::ConnectionSettings;
use crate::schema::IndexSpec;
use log::debug;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::{ClientOptions, Credential, IndexOptions, ServerAddress};
use mongodb::sync::{Client, Database};
use mongodb::IndexModel;

const APP_NAME: &str = "dbinit";

const NAMESPACE_NOT_FOUND: i32 = 26;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DUPLICATE_KEY: i32 = 11000;

/// Opens blocking driver clients for the configured server.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    settings: ConnectionSettings,
}

impl MongoConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    fn client_options(&self) -> StoreResult<ClientOptions> {
        let address = ServerAddress::parse(self.settings.address()).map_err(StoreError::Driver)?;

        let mut options = ClientOptions::default();
        options.hosts = vec![address];
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout = Some(self.settings.server_selection_timeout);

        if let (Some(username), Some(password)) =
            (&self.settings.username, &self.settings.password)
        {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = Some(password.clone());
            credential.source = Some(self.settings.auth_source.clone());
            options.credential = Some(credential);
        }
        Ok(options)
    }
}

impl Connector for MongoConnector {
    type Store = MongoStore;

    fn connect(&self, database: &str) -> StoreResult<MongoStore> {
        let client = Client::with_options(self.client_options()?).map_err(classify)?;
        let database = client.database(database);
        Ok(MongoStore { client, database })
    }

    fn target(&self) -> String {
        self.settings.address()
    }
}

/// One driver client bound to the target database.
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl SchemaStore for MongoStore {
    fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .run()
            .map_err(classify)?;
        Ok(())
    }

    fn collection_names(&self) -> StoreResult<Vec<String>> {
        self.database
            .list_collection_names()
            .run()
            .map_err(classify)
    }

    fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.database
            .create_collection(name)
            .run()
            .map_err(|err| match command_code(&err) {
                Some(NAMESPACE_EXISTS) => StoreError::NamespaceExists(name.to_string()),
                _ => classify(err),
            })
    }

    fn index_names(&self, collection: &str) -> StoreResult<Vec<String>> {
        match self
            .database
            .collection::<Document>(collection)
            .list_index_names()
            .run()
        {
            Ok(names) => Ok(names),
            Err(err) if command_code(&err) == Some(NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(err) => Err(classify(err)),
        }
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        let mut keys = Document::new();
        for field in index.fields {
            keys.insert(field.name, field.direction.as_i32());
        }

        let mut options = IndexOptions::default();
        options.name = Some(index.name.to_string());
        if index.unique {
            options.unique = Some(true);
        }

        let mut model = IndexModel::default();
        model.keys = keys;
        model.options = Some(options);

        debug!(
            "event=index_create module=store collection={} index={} unique={}",
            collection, index.name, index.unique
        );
        self.database
            .collection::<Document>(collection)
            .create_index(model)
            .run()
            .map_err(|err| match command_code(&err) {
                Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => {
                    StoreError::IndexConflict {
                        collection: collection.to_string(),
                        index: index.name.to_string(),
                        reason: err.to_string(),
                    }
                }
                Some(DUPLICATE_KEY) => StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.to_string(),
                },
                _ => classify(err),
            })?;
        Ok(())
    }

    fn close(self) {
        drop(self.database);
        drop(self.client);
    }
}

fn command_code(err: &DriverError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn classify(err: DriverError) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::Unreachable(err.to_string()),
        ErrorKind::Authentication { .. } => StoreError::Rejected(err.to_string()),
        _ => StoreError::Driver(err),
    }
}

#[cfg(test)]
mod tests {
    use super::MongoConnector;
    use crate::config::ConnectionSettings;
    use crate::schema::{Direction, IndexField, IndexSpec};
    use crate::store::{Connector, SchemaStore, StoreError};
    use std::time::Duration;

    #[test]
    fn client_options_carry_credentials_and_timeout() {
        let settings = ConnectionSettings {
            username: Some("root".to_string()),
            password: Some("s3cret".to_string()),
            ..ConnectionSettings::default()
        };
        let options = MongoConnector::new(settings).client_options().unwrap();

        assert_eq!(options.hosts.len(), 1);
        assert_eq!(options.hosts[0].to_string(), "mongodb:27017");
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(5)));
        let credential = options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("root"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[test]
    fn unauthenticated_settings_send_no_credential() {
        let options = MongoConnector::new(ConnectionSettings::default())
            .client_options()
            .unwrap();
        assert!(options.credential.is_none());
    }

    /// Needs a server on `DBINIT_TEST_MONGO_HOST` (default `localhost`) without auth.
    #[test]
    #[ignore = "requires a running MongoDB server"]
    fn live_server_errors_are_classified() {
        let host =
            std::env::var("DBINIT_TEST_MONGO_HOST").unwrap_or_else(|_| "localhost".to_string());
        let connector = MongoConnector::new(ConnectionSettings::default().with_host(host));
        let database = format!("dbinit_test_{}", uuid::Uuid::new_v4().simple());
        let store = connector.connect(&database).unwrap();
        store.ping().unwrap();

        store.create_collection("things").unwrap();
        let exists = store.create_collection("things").unwrap_err();
        assert!(matches!(exists, StoreError::NamespaceExists(name) if name == "things"));

        const NAME: IndexField = IndexField {
            name: "name",
            direction: Direction::Ascending,
        };
        const PLAIN: IndexSpec = IndexSpec {
            name: "idx_name",
            fields: &[NAME],
            unique: false,
        };
        const RENAMED: IndexSpec = IndexSpec {
            name: "idx_name_other",
            fields: &[NAME],
            unique: false,
        };
        store.create_index("things", &PLAIN).unwrap();
        store.create_index("things", &PLAIN).unwrap();
        let conflict = store.create_index("things", &RENAMED).unwrap_err();
        assert!(matches!(conflict, StoreError::IndexConflict { .. }));
        assert!(store.index_names("missing").unwrap().is_empty());

        store.database.drop().run().unwrap();
        store.close();
    }

    #[test]
    fn unreachable_server_is_classified_as_connection_failure() {
        let settings = ConnectionSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            server_selection_timeout: Duration::from_millis(200),
            ..ConnectionSettings::default()
        };
        let store = MongoConnector::new(settings).connect("db").unwrap();

        let err = store.ping().unwrap_err();
        assert!(err.is_connection_failure(), "unexpected error: {err}");
        store.close();
    }

    #[test]
    fn target_is_host_and_port() {
        let connector = MongoConnector::new(ConnectionSettings::default().with_host("localhost"));
        assert_eq!(connector.target(), "localhost:27017");
    }
}
