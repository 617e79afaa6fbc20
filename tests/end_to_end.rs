//! End-to-end scenarios driving real loopback TCP rather than mocking
//! the transport: a single producer rank and a single consumer rank,
//! each driven by an in-process [`LocalGroupComm`] of size 1, covering a
//! scalar round-trip and a 2D array with `ArraySize` dims remapped
//! through a selection.

use streammesh::comm::LocalGroupComm;
use streammesh::flow::StreamBehavior;
use streammesh::mesh::{Consumer, Producer};
use streammesh::wire::BaseType;

const INTERFACE: &str = "lo";

#[tokio::test]
async fn s1_scalar_round_trip() {
    let producer_group = LocalGroupComm::new_group(1);
    let producer_comm = producer_group.into_iter().next().unwrap();

    let (mut producer, listener) = Producer::bind(INTERFACE, 20000, 20199, &producer_comm)
        .await
        .expect("producer bind");
    producer
        .define_var("step", BaseType::U32, &[], &[], &[])
        .unwrap();

    let master_ip = producer.master_ip_address().unwrap();
    let master_port = producer.master_port().unwrap();

    let producer_task = tokio::spawn(async move {
        producer
            .var_definitions_complete(StreamBehavior::WaitForAll, 1, listener)
            .await
            .expect("var_definitions_complete");

        producer.set_value("step", &42u32.to_ne_bytes()).unwrap();
        producer.write().await.expect("write");
        producer.advance_time_step().await.expect("advance_time_step");
        producer
    });

    let consumer_group = LocalGroupComm::new_group(1);
    let consumer_comm = consumer_group.into_iter().next().unwrap();
    let mut consumer = Consumer::connect(&master_ip.to_string(), master_port, &consumer_comm)
        .await
        .expect("consumer connect");

    consumer.read().await.expect("read");

    let mut global_size = [0u32; 1];
    // `step` is a scalar; global_size_for zeroes the output rather than
    // erroring.
    consumer.global_size_for("step", &mut global_size).unwrap();
    assert_eq!(global_size, [0]);

    assert_eq!(consumer.variable_value("step").unwrap(), &42u32.to_ne_bytes());

    consumer.release_time_step().await.expect("release");

    let _producer = producer_task.await.expect("producer task panicked");
}

#[tokio::test]
async fn s2_2d_array_with_arraysize_dims_and_selection() {
    let producer_group = LocalGroupComm::new_group(1);
    let producer_comm = producer_group.into_iter().next().unwrap();

    let (mut producer, listener) = Producer::bind(INTERFACE, 20200, 20399, &producer_comm)
        .await
        .expect("producer bind");

    producer
        .define_var("gw", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var("gh", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var("lw", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var("lh", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var("ox", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var("oy", BaseType::ArraySize, &[], &[], &[])
        .unwrap();
    producer
        .define_var(
            "pixels",
            BaseType::U8,
            &["gw", "gh"],
            &["lw", "lh"],
            &["ox", "oy"],
        )
        .unwrap();

    producer.set_value("gw", &8u32.to_ne_bytes()).unwrap();
    producer.set_value("gh", &6u32.to_ne_bytes()).unwrap();
    producer.set_value("lw", &8u32.to_ne_bytes()).unwrap();
    producer.set_value("lh", &6u32.to_ne_bytes()).unwrap();
    producer.set_value("ox", &0u32.to_ne_bytes()).unwrap();
    producer.set_value("oy", &0u32.to_ne_bytes()).unwrap();

    let master_ip = producer.master_ip_address().unwrap();
    let master_port = producer.master_port().unwrap();

    let producer_task = tokio::spawn(async move {
        producer
            .var_definitions_complete(StreamBehavior::WaitForAll, 1, listener)
            .await
            .expect("var_definitions_complete");

        let tile = vec![7u8; 8 * 6];
        producer.set_value("pixels", &tile).unwrap();
        producer.write().await.expect("write");
        producer.advance_time_step().await.expect("advance_time_step");
    });

    let consumer_group = LocalGroupComm::new_group(1);
    let consumer_comm = consumer_group.into_iter().next().unwrap();
    let mut consumer = Consumer::connect(&master_ip.to_string(), master_port, &consumer_comm)
        .await
        .expect("consumer connect");

    consumer.read().await.expect("read");

    let mut global_size = [0u32; 2];
    consumer.global_size_for("pixels", &mut global_size).unwrap();
    assert_eq!(global_size, [8, 6]);

    let selection = consumer
        .create_global_array_selection("pixels", &[8, 6], &[0, 0])
        .expect("create_global_array_selection");
    let mut user_buffer = vec![0u8; 8 * 6];
    consumer
        .fill_selection(&selection, &mut user_buffer)
        .expect("fill_selection");
    assert!(user_buffer.iter().all(|&b| b == 7));

    consumer.release_time_step().await.expect("release");
    producer_task.await.expect("producer task panicked");
}

#[tokio::test]
async fn late_joining_consumer_receives_every_variable_on_its_first_frame() {
    let producer_group = LocalGroupComm::new_group(1);
    let producer_comm = producer_group.into_iter().next().unwrap();

    let (mut producer, listener) = Producer::bind(INTERFACE, 20400, 20599, &producer_comm)
        .await
        .expect("producer bind");
    producer
        .define_var("step", BaseType::U32, &[], &[], &[])
        .unwrap();
    producer.set_value("step", &7u32.to_ne_bytes()).unwrap();

    let master_ip = producer.master_ip_address().unwrap();
    let master_port = producer.master_port().unwrap();

    let (consumer2_ready_tx, consumer2_ready_rx) = tokio::sync::oneshot::channel::<()>();

    let producer_task = tokio::spawn(async move {
        producer
            .var_definitions_complete(StreamBehavior::WaitForAll, 1, listener)
            .await
            .expect("var_definitions_complete");

        for _ in 0..3u32 {
            producer.write().await.expect("write");
            producer.advance_time_step().await.expect("advance_time_step");
        }

        // Wait until the second consumer has finished its handshake (it
        // sits in the accept channel until the next `advance_time_step`
        // drains it) so the absorb/resend split below is deterministic
        // instead of racing its TCP connect.
        consumer2_ready_rx.await.expect("consumer2 ready signal");

        // Absorb round: nothing is sent to the new connection since it
        // isn't in `connections` yet when `write` runs; `advance_time_step`
        // picks it up opportunistically while waiting on the first
        // consumer's release.
        producer.write().await.expect("write (absorb round)");
        producer
            .advance_time_step()
            .await
            .expect("advance_time_step (absorb round)");

        // Resend round: `step` hasn't changed since it was first set, but
        // the new connection's `is_new` flag forces a resend regardless.
        producer.write().await.expect("write (resend round)");
        producer
            .advance_time_step()
            .await
            .expect("advance_time_step (resend round)");
    });

    let consumer1_group = LocalGroupComm::new_group(1);
    let consumer1_comm = consumer1_group.into_iter().next().unwrap();
    let master_ip_str = master_ip.to_string();
    let consumer1_task = tokio::spawn(async move {
        let mut consumer = Consumer::connect(&master_ip_str, master_port, &consumer1_comm)
            .await
            .expect("consumer1 connect");
        for _ in 0..5u32 {
            consumer.read().await.expect("consumer1 read");
            consumer.release_time_step().await.expect("consumer1 release");
        }
    });

    let consumer2_group = LocalGroupComm::new_group(1);
    let consumer2_comm = consumer2_group.into_iter().next().unwrap();
    let mut consumer2 = Consumer::connect(&master_ip.to_string(), master_port, &consumer2_comm)
        .await
        .expect("late consumer connect");
    consumer2_ready_tx.send(()).expect("producer task still waiting");

    // Absorb round: joined mid-frame, gets only the bare end-of-frame
    // sentinel this time.
    consumer2.read().await.expect("late consumer absorb read");
    consumer2
        .release_time_step()
        .await
        .expect("late consumer absorb release");

    // Resend round: `step` arrives even though it was never re-updated.
    consumer2.read().await.expect("late consumer read");
    assert_eq!(
        consumer2.variable_value("step").unwrap(),
        &7u32.to_ne_bytes()
    );
    consumer2
        .release_time_step()
        .await
        .expect("late consumer release");

    producer_task.await.expect("producer task panicked");
    consumer1_task.await.expect("consumer1 task panicked");
}
