#[cfg(test)]
mod tests {
    use crate::service::{FleetService, FleetServiceImpl, VehicleTrace};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::time::Duration;
    use mockall::*;
    use vehiclestore_core::storage::{BinValue, Record, StoreTable};
    use vehiclestore_core::{
        ElasticPool, MemoryStore, PoolConfig, RecordStore, Result, Settings, StoreError,
        VehicleData, VehicleDataStore, VehiclesRepository,
    };

    const HOUR: i64 = 3_600_000_000;
    // 2020-03-12 15:12:00 UTC
    const T: i64 = 1_584_025_920_000_000;

    mock! {
        pub Store {}
        impl RecordStore for Store {
            fn get(&self, table: &StoreTable, key: &str) -> Result<Option<Record>>;
            fn batch_get(&self, table: &StoreTable, keys: &[String]) -> Result<Vec<Option<Record>>>;
            fn put(
                &self,
                table: &StoreTable,
                key: &str,
                bins: Vec<(String, BinValue)>,
            ) -> Result<()>;
            fn map_insert(
                &self,
                table: &StoreTable,
                key: &str,
                bin: &str,
                map_key: &str,
                value: i64,
            ) -> Result<()>;
            fn range_delete(&self, table: &StoreTable) -> Result<()>;
        }
    }

    mock! {
        pub Repository {}
        impl VehiclesRepository for Repository {
            fn write_data(&self, sample: &VehicleData) -> Result<()>;
            fn get_operators(&self, from: i64, to: i64) -> Result<BTreeSet<String>>;
            fn get_vehicles_of_operator(
                &self,
                from: i64,
                to: i64,
                operator_id: &str,
            ) -> Result<BTreeSet<VehicleData>>;
            fn get_vehicles_stopped_of_operator(
                &self,
                from: i64,
                to: i64,
                operator_id: &str,
            ) -> Result<BTreeSet<String>>;
            fn get_vehicles_data_with_id(
                &self,
                from: i64,
                to: i64,
                vehicle_id: &str,
            ) -> Result<BTreeSet<VehicleData>>;
            fn invalidate_sample(&self, sample: &VehicleData);
            fn delete_all_data(&self) -> Result<()>;
            fn invalidate_all_cache(&self);
        }
    }

    fn pool() -> Arc<ElasticPool> {
        Arc::new(ElasticPool::new(PoolConfig::new(2, 4, Duration::from_secs(1))))
    }

    fn store_service(store: MockStore) -> FleetServiceImpl {
        let pool = pool();
        let settings = Settings::default();
        let repository = VehicleDataStore::new(Arc::new(store), Arc::clone(&pool), &settings);
        FleetServiceImpl::new(Arc::new(repository), pool)
    }

    fn repository_service(repository: MockRepository) -> FleetServiceImpl {
        FleetServiceImpl::new(Arc::new(repository), pool())
    }

    fn memory_service() -> FleetServiceImpl {
        FleetServiceImpl::from_settings(Arc::new(MemoryStore::new()), &Settings::default())
    }

    fn samples(items: &[(i64, &str, &str)]) -> BTreeSet<VehicleData> {
        items
            .iter()
            .map(|(ts, vehicle, operator)| VehicleData::new(*ts, *vehicle, *operator))
            .collect()
    }

    #[tokio::test]
    async fn test_write_appends_to_every_index() {
        let mut store = MockStore::new();
        store.expect_get().times(1).returning(|_, _| Ok(None));
        store
            .expect_put()
            .times(1)
            .withf(|table, key, bins| {
                table.set == "vehicles"
                    && key == format!("{}:v1", T / HOUR)
                    && bins.len() == 1
                    && bins[0].0 == "databin"
            })
            .returning(|_, _, _| Ok(()));
        store
            .expect_map_insert()
            .times(3)
            .withf(|_, _, bin, map_key, value| {
                let entity = map_key.ends_with(":v1") || map_key.ends_with(":o1");
                bin == "data" && *value == 0 && entity
            })
            .returning(|_, _, _, _, _| Ok(()));

        let service = store_service(store);
        assert!(service.ingest(VehicleData::new(T, "v1", "o1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_read_failure_fails_the_write() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("read timeout".to_string())));
        store.expect_put().never();
        store.expect_map_insert().never();

        let service = store_service(store);
        let result = service.ingest(VehicleData::new(T, "v1", "o1")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_put_failure_skips_the_indexes() {
        let mut store = MockStore::new();
        store.expect_get().returning(|_, _| Ok(None));
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Unavailable("write timeout".to_string())));
        store.expect_map_insert().never();

        let service = store_service(store);
        let result = service.ingest(VehicleData::new(T, "v1", "o1")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("write timeout"));
    }

    #[tokio::test]
    async fn test_batch_failure_fails_the_query() {
        let mut store = MockStore::new();
        store
            .expect_batch_get()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("batch timeout".to_string())));

        let service = store_service(store);
        let result = service.running_operators(T - HOUR, T + HOUR).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_undecodable_bucket_reads_as_empty_trace() {
        let hour = T / HOUR;
        let mut store = MockStore::new();
        store.expect_batch_get().returning(move |table, keys| {
            Ok(keys
                .iter()
                .map(|key| match table.set.as_str() {
                    "datevehiclepart" if *key == hour.to_string() => {
                        let entries = BTreeMap::from([(format!("{}:v1", hour), 0)]);
                        Some(Record::default().with_bin("data", BinValue::Map(entries)))
                    }
                    "vehicles" => {
                        let payload = BinValue::Str("[{oops".to_string());
                        Some(Record::default().with_bin("databin", payload))
                    }
                    _ => None,
                })
                .collect())
        });

        let service = store_service(store);
        let trace = service.vehicle_trace(T - HOUR, T + HOUR, "v1".to_string()).await.unwrap();
        assert_eq!(trace.id, "v1");
        assert!(trace.trace.is_empty());
    }

    #[tokio::test]
    async fn test_vehicles_of_operator_returns_distinct_ids() {
        let mut repository = MockRepository::new();
        repository
            .expect_get_vehicles_of_operator()
            .times(1)
            .withf(|from, to, operator| *from == 1 && *to == 9 && operator == "o1")
            .returning(|_, _, _| Ok(samples(&[(1, "v1", "o1"), (2, "v2", "o1"), (3, "v1", "o1")])));
        repository.expect_get_vehicles_stopped_of_operator().never();

        let service = repository_service(repository);
        let ids = service.vehicles_of_operator(1, 9, "o1".to_string(), false).await.unwrap();
        assert_eq!(ids, BTreeSet::from(["v1".to_string(), "v2".to_string()]));
    }

    #[tokio::test]
    async fn test_stopped_flag_routes_to_stopped_query() {
        let mut repository = MockRepository::new();
        repository.expect_get_vehicles_of_operator().never();
        repository
            .expect_get_vehicles_stopped_of_operator()
            .times(1)
            .return_once(|_, _, _| Ok(BTreeSet::from(["v7".to_string()])));

        let service = repository_service(repository);
        let ids = service.vehicles_of_operator(1, 9, "o1".to_string(), true).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("v7"));
    }

    #[tokio::test]
    async fn test_vehicle_trace_is_ordered_by_time() {
        let mut repository = MockRepository::new();
        repository.expect_get_vehicles_data_with_id().times(1).returning(|_, _, _| {
            Ok([
                VehicleData::new(30, "v3", "o33").with_position(1.0, 2.0),
                VehicleData::new(10, "v3", "o31").with_position(3.0, 4.0),
            ]
            .into_iter()
            .collect())
        });

        let service = repository_service(repository);
        let trace = service.vehicle_trace(0, 100, "v3".to_string()).await.unwrap();
        let stamps: Vec<i64> = trace.trace.iter().map(|p| p.ts_micro).collect();
        assert_eq!(stamps, vec![10, 30]);
        assert_eq!(trace.trace[0].lon, 3.0);

        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["trace"][0]["tsMicro"], 10);
    }

    #[tokio::test]
    async fn test_repository_errors_reach_the_caller() {
        let mut repository = MockRepository::new();
        repository
            .expect_get_operators()
            .times(1)
            .return_once(|_, _| Err(StoreError::Unavailable("down".to_string())));

        let service = repository_service(repository);
        assert!(service.running_operators(0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_single_sample_operator() {
        let service = memory_service();
        service.ingest(VehicleData::new(T, "v1", "o1")).await.unwrap();

        let operators = service.running_operators(T - HOUR, T + HOUR).await.unwrap();
        assert_eq!(operators, BTreeSet::from(["o1".to_string()]));
    }

    #[tokio::test]
    async fn test_sixty_of_hundred_operators() {
        let service = memory_service();
        let writes = (0..100).map(|i| {
            service.ingest(VehicleData::new(T + i, format!("v{}", i), format!("o{}", i)))
        });
        futures::future::try_join_all(writes).await.unwrap();

        let operators = service.running_operators(T, T + 59).await.unwrap();
        assert_eq!(operators.len(), 60);
    }

    #[tokio::test]
    async fn test_stopped_then_moving_vehicle() {
        let service = memory_service();
        let minute = 60_000_000;
        for i in 0..20 {
            let sample = VehicleData::new(T + i * minute, "v1", "o").at_stop("s1", i < 10);
            service.ingest(sample).await.unwrap();
        }

        let stopped = service
            .vehicles_of_operator(T, T + 9 * minute, "o".to_string(), true)
            .await
            .unwrap();
        assert_eq!(stopped, BTreeSet::from(["v1".to_string()]));

        let stopped = service
            .vehicles_of_operator(T, T + 11 * minute, "o".to_string(), true)
            .await
            .unwrap();
        assert!(stopped.is_empty());

        let running = service
            .vehicles_of_operator(T, T + 11 * minute, "o".to_string(), false)
            .await
            .unwrap();
        assert_eq!(running, BTreeSet::from(["v1".to_string()]));
    }

    #[tokio::test]
    async fn test_trace_across_operators() {
        let service = memory_service();
        service.ingest(VehicleData::new(T + 2 * HOUR, "v3", "o33")).await.unwrap();
        service.ingest(VehicleData::new(T + HOUR, "v3", "o31")).await.unwrap();

        let trace = service.vehicle_trace(T, T + 3 * HOUR, "v3".to_string()).await.unwrap();
        let written = samples(&[(T + HOUR, "v3", "o31"), (T + 2 * HOUR, "v3", "o33")]);
        let expected = VehicleTrace::from_samples("v3", &written);
        assert_eq!(trace, expected);
    }

    #[test]
    fn test_blocking_callers() {
        let service = memory_service();
        let ingested = tokio_test::block_on(service.ingest(VehicleData::new(T, "v1", "o1")));
        tokio_test::assert_ok!(ingested);
        let operators = tokio_test::block_on(service.running_operators(T, T)).unwrap();
        assert_eq!(operators.len(), 1);
        assert!(service.pool().pool_size() >= 1);
    }
}
