//! Telemetry reader tests
//!
//! Drive the reader through an in-memory backend so partial-failure and
//! unit-conversion behaviour can be checked without a GPU.

#[cfg(test)]
mod fake_backend_tests {
    use crate::error::TelemetryError;
    use crate::telemetry::{AcceleratorBackend, MemoryReading, TelemetryReader, UtilizationReading};
    use std::sync::Arc;
    use std::time::Duration;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[derive(Clone)]
    struct FakeDevice {
        name: &'static str,
        memory: MemoryReading,
        utilization: UtilizationReading,
        temperature: Option<u32>,
        power_usage_mw: Option<u32>,
        power_limit_mw: Option<u32>,
        fail_memory: bool,
    }

    impl FakeDevice {
        fn new(name: &'static str, total_gib: u64, used_gib: u64) -> Self {
            Self {
                name,
                memory: MemoryReading {
                    total: total_gib * GIB,
                    used: used_gib * GIB,
                    free: (total_gib - used_gib) * GIB,
                },
                utilization: UtilizationReading { gpu: 35, memory: 12 },
                temperature: Some(54),
                power_usage_mw: Some(120_500),
                power_limit_mw: Some(450_000),
                fail_memory: false,
            }
        }
    }

    struct FakeBackend {
        devices: Vec<FakeDevice>,
        stall: Option<Duration>,
    }

    impl FakeBackend {
        fn new(devices: Vec<FakeDevice>) -> Self {
            Self { devices, stall: None }
        }

        fn device(&self, index: u32) -> Result<&FakeDevice, TelemetryError> {
            self.devices
                .get(index as usize)
                .ok_or_else(|| TelemetryError::query(index, "handle", "no such device"))
        }
    }

    fn unsupported(index: u32, field: &'static str) -> TelemetryError {
        TelemetryError::query(index, field, "Not Supported")
    }

    impl AcceleratorBackend for FakeBackend {
        fn driver_version(&self) -> Result<String, TelemetryError> {
            if let Some(stall) = self.stall {
                std::thread::sleep(stall);
            }
            Ok("535.154.05".to_string())
        }

        fn device_count(&self) -> Result<u32, TelemetryError> {
            Ok(self.devices.len() as u32)
        }

        fn device_name(&self, index: u32) -> Result<String, TelemetryError> {
            Ok(self.device(index)?.name.to_string())
        }

        fn memory(&self, index: u32) -> Result<MemoryReading, TelemetryError> {
            let device = self.device(index)?;
            if device.fail_memory {
                return Err(TelemetryError::query(index, "memory", "GPU is lost"));
            }
            Ok(device.memory)
        }

        fn utilization(&self, index: u32) -> Result<UtilizationReading, TelemetryError> {
            Ok(self.device(index)?.utilization)
        }

        fn temperature_celsius(&self, index: u32) -> Result<u32, TelemetryError> {
            self.device(index)?
                .temperature
                .ok_or_else(|| unsupported(index, "temperature"))
        }

        fn power_usage_milliwatts(&self, index: u32) -> Result<u32, TelemetryError> {
            self.device(index)?
                .power_usage_mw
                .ok_or_else(|| unsupported(index, "power_usage"))
        }

        fn power_limit_milliwatts(&self, index: u32) -> Result<u32, TelemetryError> {
            self.device(index)?
                .power_limit_mw
                .ok_or_else(|| unsupported(index, "power_limit"))
        }
    }

    fn reader(devices: Vec<FakeDevice>) -> TelemetryReader<FakeBackend> {
        TelemetryReader::new(Ok(FakeBackend::new(devices)))
    }

    #[test]
    fn test_reads_all_devices_in_index_order() {
        let reader = reader(vec![
            FakeDevice::new("NVIDIA GeForce RTX 4090", 24, 6),
            FakeDevice::new("NVIDIA A100-SXM4-80GB", 80, 40),
        ]);

        let snapshot = reader.read_accelerators().unwrap();
        assert_eq!(snapshot.driver_version, "535.154.05");
        assert_eq!(snapshot.device_count(), 2);

        let first = &snapshot.devices[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.name, "NVIDIA GeForce RTX 4090");
        assert_eq!(first.memory_total_gb(), 24.0);
        assert_eq!(first.memory_used_gb(), 6.0);
        assert_eq!(first.memory_free_gb(), 18.0);
        assert_eq!(first.memory_used_percent(), 25.0);
        assert_eq!(first.temperature_celsius, Some(54));
        assert_eq!(first.power_watts_current, Some(120.5));
        assert_eq!(first.power_watts_max, Some(450.0));

        assert_eq!(snapshot.devices[1].index, 1);
    }

    #[test]
    fn test_memory_and_utilization_invariants() {
        let mut reserved = FakeDevice::new("reserved", 16, 4);
        // Driver holds back 512MiB outside used/free
        reserved.memory.free -= 512 * 1024 * 1024;
        let mut overreport = FakeDevice::new("overreport", 8, 2);
        overreport.memory.used = 9 * GIB;
        overreport.utilization = UtilizationReading { gpu: 140, memory: 101 };

        let snapshot = reader(vec![reserved, overreport]).read_accelerators().unwrap();

        for device in &snapshot.devices {
            assert_eq!(
                device.memory_used_bytes + device.memory_free_bytes,
                device.memory_total_bytes
            );
            assert!(device.utilization_percent <= 100);
            assert!(device.memory_utilization_percent <= 100);
        }
        assert_eq!(snapshot.devices[1].memory_free_bytes, 0);
    }

    #[test]
    fn test_optional_fields_fail_independently() {
        let mut no_temp = FakeDevice::new("no-temp", 24, 0);
        no_temp.temperature = None;
        let mut no_power = FakeDevice::new("no-power", 24, 0);
        no_power.power_usage_mw = None;
        let mut no_limit = FakeDevice::new("no-limit", 24, 0);
        no_limit.power_limit_mw = None;

        let snapshot = reader(vec![no_temp, no_power, no_limit])
            .read_accelerators()
            .unwrap();

        let d = &snapshot.devices;
        assert_eq!(d[0].temperature_celsius, None);
        assert_eq!(d[0].power_watts_current, Some(120.5));

        assert_eq!(d[1].temperature_celsius, Some(54));
        assert_eq!(d[1].power_watts_current, None);
        assert_eq!(d[1].power_watts_max, Some(450.0));

        assert_eq!(d[2].power_watts_current, Some(120.5));
        assert_eq!(d[2].power_watts_max, None);
    }

    #[test]
    fn test_required_field_failure_fails_snapshot() {
        let mut lost = FakeDevice::new("lost", 24, 0);
        lost.fail_memory = true;

        let err = reader(vec![FakeDevice::new("ok", 24, 0), lost])
            .read_accelerators()
            .unwrap_err();

        assert_eq!(
            err,
            TelemetryError::Query {
                index: 1,
                field: "memory",
                reason: "GPU is lost".to_string()
            }
        );
    }

    #[test]
    fn test_unavailable_backend_is_reported_not_raised() {
        let reader: TelemetryReader<FakeBackend> =
            TelemetryReader::new(Err(TelemetryError::unavailable("driver not loaded")));

        assert!(!reader.is_available());
        let err = reader.read_accelerators().unwrap_err();
        assert!(matches!(err, TelemetryError::Unavailable { .. }));

        // Host read still works
        let specs = reader.read_system_specs();
        assert!(specs.gpu.is_none());
        assert!(specs.gpu_error.unwrap().contains("driver not loaded"));
        assert!(specs.host.cpu_logical_threads >= 1);
    }

    #[test]
    fn test_zero_devices_is_unavailable() {
        let reader = reader(vec![]);
        let err = reader.read_accelerators().unwrap_err();
        assert_eq!(err, TelemetryError::unavailable("no accelerator devices found"));

        let specs = reader.read_system_specs();
        assert!(specs.gpu.is_none());
        assert!(specs.gpu_error.unwrap().contains("no accelerator devices"));
    }

    #[test]
    fn test_zero_devices_reported_by_capacity_estimate() {
        let reading = reader(vec![]).read_accelerators();
        let request = crate::models::CapacityRequest::new("gpt2");

        let rec = crate::capacity::estimate(&request, reading.as_ref());

        assert!(rec.telemetry_error.is_some());
        assert!(rec.per_device_analysis.is_empty());
        assert!(!rec.current_system_suitable);
    }

    #[tokio::test]
    async fn test_read_within_timeout() {
        let reader = Arc::new(reader(vec![FakeDevice::new("fast", 24, 1)]));
        let snapshot = reader
            .read_accelerators_within(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snapshot.device_count(), 1);
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let mut backend = FakeBackend::new(vec![FakeDevice::new("slow", 24, 1)]);
        backend.stall = Some(Duration::from_millis(500));
        let reader = Arc::new(TelemetryReader::new(Ok(backend)));

        let err = reader
            .read_accelerators_within(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, TelemetryError::TimedOut { after_ms: 50 });
    }

    #[test]
    fn test_shutdown_consumes_reader() {
        let reader = reader(vec![FakeDevice::new("gpu", 24, 0)]);
        reader.shutdown();
    }
}
