//! Collection reconciler
//!
//! Computes the symmetric difference between what the store says each
//! curated collection should contain and what Plex currently has, then
//! applies additions (scan mode) or additions and removals (verify mode).
//! Mutations are applied item by item so one failure never abandons the
//! rest; failures are logged and excluded from the reported counts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use felarr_core::{
    CapabilityPredicate, CapabilityStore, CollectionChange, Result,
};
use tracing::{error, info};

use crate::client::PlexClient;

/// Collection names; `None` disables that collection entirely.
#[derive(Debug, Clone)]
pub struct CollectionsConfig {
    pub all_dv: Option<String>,
    pub profile7_fel: Option<String>,
    pub truehd_atmos: Option<String>,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            all_dv: Some("All Dolby Vision".to_string()),
            profile7_fel: Some("DV P7 FEL".to_string()),
            truehd_atmos: Some("TrueHD Atmos".to_string()),
        }
    }
}

impl CollectionsConfig {
    fn enabled(&self) -> Vec<(&str, CapabilityPredicate)> {
        let mut list = Vec::new();
        if let Some(name) = &self.all_dv {
            list.push((name.as_str(), CapabilityPredicate::HasDv));
        }
        if let Some(name) = &self.profile7_fel {
            list.push((name.as_str(), CapabilityPredicate::HasP7Fel));
        }
        if let Some(name) = &self.truehd_atmos {
            list.push((name.as_str(), CapabilityPredicate::HasAtmos));
        }
        list
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Additions only; never removes members.
    Scan,
    /// Additions and removals; membership converges to the predicate set.
    Verify,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub added: Vec<CollectionChange>,
    pub removed: Vec<CollectionChange>,
    /// Successful additions per collection.
    pub added_counts: Vec<(String, usize)>,
}

pub struct CollectionReconciler {
    client: Arc<PlexClient>,
    store: Arc<dyn CapabilityStore>,
    config: CollectionsConfig,
}

impl CollectionReconciler {
    pub fn new(
        client: Arc<PlexClient>,
        store: Arc<dyn CapabilityStore>,
        config: CollectionsConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Reconcile every enabled collection. Converges in one call on a
    /// stable library; a second call right after is a no-op.
    pub async fn reconcile(&self, mode: ReconcileMode) -> Result<ReconcileReport> {
        let section_key = self.client.section_key().await?;
        let machine_id = self.client.server_identity().await?;
        let existing: HashMap<String, String> = self
            .client
            .collections(&section_key)
            .await?
            .into_iter()
            .map(|c| (c.title, c.key))
            .collect();

        let mut report = ReconcileReport::default();

        for (name, predicate) in self.config.enabled() {
            let desired: HashMap<String, _> = self
                .store
                .get_where(predicate)
                .await?
                .into_iter()
                .map(|r| (r.rating_key.clone(), r))
                .collect();

            match existing.get(name) {
                Some(collection_key) => {
                    self.reconcile_existing(
                        name,
                        collection_key,
                        &machine_id,
                        &desired,
                        mode,
                        &mut report,
                    )
                    .await?;
                }
                None => {
                    // Missing collection: create it seeded with the desired
                    // set; nothing to create when the set is empty.
                    if desired.is_empty() {
                        continue;
                    }
                    let keys: Vec<String> = desired.keys().cloned().collect();
                    match self
                        .client
                        .create_collection(&section_key, &machine_id, name, &keys)
                        .await
                    {
                        Ok(()) => {
                            info!(collection = name, count = keys.len(), "created collection");
                            for record in desired.values() {
                                report.added.push(CollectionChange {
                                    collection: name.to_string(),
                                    title: record.title.clone(),
                                    year: record.year,
                                });
                            }
                            report.added_counts.push((name.to_string(), keys.len()));
                        }
                        Err(err) => {
                            error!(collection = name, %err, "collection create failed");
                            report.added_counts.push((name.to_string(), 0));
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    async fn reconcile_existing(
        &self,
        name: &str,
        collection_key: &str,
        machine_id: &str,
        desired: &HashMap<String, felarr_core::CapabilityRecord>,
        mode: ReconcileMode,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let members = self.client.collection_items(collection_key).await?;
        let member_keys: HashSet<String> =
            members.iter().map(|m| m.rating_key.clone()).collect();

        let mut added = 0usize;
        for (rating_key, record) in desired {
            if member_keys.contains(rating_key) {
                continue;
            }
            match self
                .client
                .add_to_collection(collection_key, machine_id, rating_key)
                .await
            {
                Ok(()) => {
                    added += 1;
                    report.added.push(CollectionChange {
                        collection: name.to_string(),
                        title: record.title.clone(),
                        year: record.year,
                    });
                }
                Err(err) => {
                    error!(
                        collection = name,
                        item = record.title.as_str(),
                        %err,
                        "collection add failed"
                    );
                }
            }
        }
        report.added_counts.push((name.to_string(), added));

        if mode == ReconcileMode::Verify {
            for member in &members {
                if desired.contains_key(&member.rating_key) {
                    continue;
                }
                match self
                    .client
                    .remove_from_collection(collection_key, &member.rating_key)
                    .await
                {
                    Ok(()) => {
                        report.removed.push(CollectionChange {
                            collection: name.to_string(),
                            title: member.title.clone(),
                            year: member.year,
                        });
                    }
                    Err(err) => {
                        error!(
                            collection = name,
                            item = member.title.as_str(),
                            %err,
                            "collection remove failed"
                        );
                    }
                }
            }
            if !report.removed.is_empty() {
                info!(
                    collection = name,
                    removed = report.removed.len(),
                    "removed stale collection members"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PlexClient, PlexConfig};
    use async_trait::async_trait;
    use felarr_core::{CapabilityRecord, Result};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedStore {
        records: Vec<CapabilityRecord>,
    }

    #[async_trait]
    impl CapabilityStore for FixedStore {
        async fn upsert_capability(&self, _: &CapabilityRecord) -> Result<()> {
            Ok(())
        }
        async fn get_by_key(&self, _: &str) -> Result<Option<CapabilityRecord>> {
            Ok(None)
        }
        async fn get_all(&self) -> Result<Vec<CapabilityRecord>> {
            Ok(self.records.clone())
        }
        async fn get_where(
            &self,
            predicate: CapabilityPredicate,
        ) -> Result<Vec<CapabilityRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| predicate.matches(r))
                .cloned()
                .collect())
        }
        async fn find_by_title(
            &self,
            _: &str,
            _: Option<i32>,
        ) -> Result<Option<CapabilityRecord>> {
            Ok(None)
        }
    }

    async fn mount_common(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer machineIdentifier="machine1"/>"#,
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/sections"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer><Directory key="1" title="Movies"/></MediaContainer>"#,
            ))
            .mount(server)
            .await;
    }

    fn fel_only_config() -> CollectionsConfig {
        CollectionsConfig {
            all_dv: None,
            profile7_fel: Some("DV P7 FEL".to_string()),
            truehd_atmos: None,
        }
    }

    fn fel_record(key: &str, title: &str) -> CapabilityRecord {
        CapabilityRecord::new(key, title).with_dolby_vision(Some("7".to_string()), true)
    }

    #[tokio::test]
    async fn verify_removes_stale_members_and_converges() {
        let server = MockServer::start().await;
        mount_common(&server).await;

        Mock::given(method("GET"))
            .and(path("/library/sections/1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer>
                    <Directory ratingKey="77" title="DV P7 FEL"/>
                </MediaContainer>"#,
            ))
            .mount(&server)
            .await;
        // membership: one valid, one stale (removed from the library)
        Mock::given(method("GET"))
            .and(path("/library/collections/77/children"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer>
                    <Video ratingKey="101" title="Dune" year="2021"/>
                    <Video ratingKey="999" title="Gone Movie" year="2001"/>
                </MediaContainer>"#,
            ))
            .mount(&server)
            .await;
        let remove = Mock::given(method("DELETE"))
            .and(path("/library/collections/77/children/999"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let client = Arc::new(
            PlexClient::new(PlexConfig {
                base_url: server.uri(),
                token: "t".to_string(),
                library_name: "Movies".to_string(),
                ..PlexConfig::default()
            })
            .unwrap(),
        );
        let store = Arc::new(FixedStore {
            records: vec![fel_record("101", "Dune")],
        });

        let reconciler = CollectionReconciler::new(client, store, fel_only_config());
        let report = reconciler.reconcile(ReconcileMode::Verify).await.unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].title, "Gone Movie");
        assert_eq!(report.added.len(), 0);
        drop(remove);
    }

    #[tokio::test]
    async fn scan_mode_never_removes() {
        let server = MockServer::start().await;
        mount_common(&server).await;

        Mock::given(method("GET"))
            .and(path("/library/sections/1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer>
                    <Directory ratingKey="77" title="DV P7 FEL"/>
                </MediaContainer>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/collections/77/children"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<MediaContainer>
                    <Video ratingKey="999" title="Gone Movie" year="2001"/>
                </MediaContainer>"#,
            ))
            .mount(&server)
            .await;
        let add = Mock::given(method("PUT"))
            .and(path("/library/collections/77/items"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let client = Arc::new(
            PlexClient::new(PlexConfig {
                base_url: server.uri(),
                token: "t".to_string(),
                library_name: "Movies".to_string(),
                ..PlexConfig::default()
            })
            .unwrap(),
        );
        let store = Arc::new(FixedStore {
            records: vec![fel_record("101", "Dune")],
        });

        let reconciler = CollectionReconciler::new(client, store, fel_only_config());
        let report = reconciler.reconcile(ReconcileMode::Scan).await.unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].title, "Dune");
        assert!(report.removed.is_empty());
        assert_eq!(report.added_counts, vec![("DV P7 FEL".to_string(), 1)]);
        drop(add);
    }

    #[tokio::test]
    async fn missing_collection_is_created_seeded() {
        let server = MockServer::start().await;
        mount_common(&server).await;

        Mock::given(method("GET"))
            .and(path("/library/sections/1/collections"))
            .respond_with(ResponseTemplate::new(200)
                .set_body_string(r#"<MediaContainer></MediaContainer>"#))
            .mount(&server)
            .await;
        let create = Mock::given(method("POST"))
            .and(path("/library/collections"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let client = Arc::new(
            PlexClient::new(PlexConfig {
                base_url: server.uri(),
                token: "t".to_string(),
                library_name: "Movies".to_string(),
                ..PlexConfig::default()
            })
            .unwrap(),
        );
        let store = Arc::new(FixedStore {
            records: vec![fel_record("101", "Dune")],
        });

        let reconciler = CollectionReconciler::new(client, store, fel_only_config());
        let report = reconciler.reconcile(ReconcileMode::Scan).await.unwrap();
        assert_eq!(report.added.len(), 1);
        drop(create);
    }

    #[tokio::test]
    async fn empty_desired_set_creates_nothing() {
        let server = MockServer::start().await;
        mount_common(&server).await;

        Mock::given(method("GET"))
            .and(path("/library/sections/1/collections"))
            .respond_with(ResponseTemplate::new(200)
                .set_body_string(r#"<MediaContainer></MediaContainer>"#))
            .mount(&server)
            .await;

        let client = Arc::new(
            PlexClient::new(PlexConfig {
                base_url: server.uri(),
                token: "t".to_string(),
                library_name: "Movies".to_string(),
                ..PlexConfig::default()
            })
            .unwrap(),
        );
        let store = Arc::new(FixedStore { records: vec![] });

        let reconciler = CollectionReconciler::new(client, store, fel_only_config());
        let report = reconciler.reconcile(ReconcileMode::Verify).await.unwrap();
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
    }
}
