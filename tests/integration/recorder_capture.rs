//! Full pipeline capture: probe process through broker into the recorder

use std::time::Duration;

use telepoint::broker::Broker;
use telepoint::index::MemoryIndex;
use telepoint::logging::LogHandle;
use telepoint::protocol::ProbeReport;
use telepoint::recorder::Recorder;
use telepoint::transport::Endpoint;

use crate::helpers;

#[tokio::test]
async fn recorded_file_matches_its_index() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("capture.data");

    let mut controller = helpers::timeofday_controller("node1", 1).await;

    let broker = Broker::start(
        &Endpoint::new("127.0.0.1", 0),
        &Endpoint::new("127.0.0.1", 0),
        LogHandle::new("capture-test"),
    )
    .await
    .unwrap();
    broker
        .add(
            Some(controller.discovery_endpoint().clone()),
            controller.publish_endpoint().clone(),
        )
        .await
        .unwrap();

    let index = MemoryIndex::new();
    let recorder = Recorder::start(
        &output,
        Box::new(index.clone()),
        LogHandle::new("capture-test/recorder"),
    )
    .await
    .unwrap();
    recorder.add(broker.publish_endpoint().clone()).await.unwrap();

    controller.start_probes().await;
    assert_eq!(controller.failed_count(), 0);

    // a one second period gives a record roughly every second once the
    // subscription has propagated through both tiers
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while index.entries().len() < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "recorder captured {} records, wanted 2",
            index.entries().len()
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    controller.stop_probes().await;
    recorder.shutdown().await.unwrap();
    broker.shutdown().await.unwrap();
    controller.shutdown().await.unwrap();

    // walk the data file: every record is length-prefixed and sits exactly
    // where its index entry says
    let data = std::fs::read(&output).unwrap();
    let entries = index.entries();
    assert!(entries.len() >= 2);

    let mut offset: u64 = 0;
    for entry in &entries {
        let prefix = &data[offset as usize..offset as usize + 4];
        let len = u64::from(u32::from_be_bytes(prefix.try_into().unwrap()));

        assert_eq!(entry.offset, offset + 4);
        assert_eq!(entry.size, len);
        assert_eq!(entry.probe, "Probes.TimeOfDay.node1");
        assert_eq!(entry.tag, "node1");

        let payload = &data[entry.offset as usize..(entry.offset + entry.size) as usize];
        let report: ProbeReport = serde_json::from_slice(payload).unwrap();
        assert_eq!(report.timestamp, entry.time);
        assert_eq!(report.tag, entry.tag);

        offset += 4 + len;
    }

    // no trailing bytes beyond the indexed records
    assert_eq!(offset as usize, data.len());

    // consecutive captures land on consecutive period boundaries
    assert!(entries[1].time > entries[0].time);
}
