//! Workers and the sink wired by hand, one handoff at a time.

use core::fmt::Write as _;
use core::future::pending;

use relay::sync::channel::Channel;
use relay::sync::SampleCell;
use relay::{InterruptHandler as _, Kernel, KernelConfig, Semaphore, TaskConfig};
use relay_pipeline::sim::{SimAdc, Waveform};
use relay_pipeline::sink::{Inbox, SinkCounters};
use relay_pipeline::workers::{AdcJob, WorkerCounters};
use relay_pipeline::{
    Activation, AdcHandoff, CaptureTransport, Handoff, Job, JobError, Message, SampleSource as _,
    Sink, Tag, Worker, BANNER, QUEUE_DEPTH,
};

const STACK: usize = 4096;

fn kernel() -> &'static Kernel {
    Box::leak(Box::new(Kernel::new(KernelConfig::new())))
}

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

/// Numbers its messages.
struct Counter(u32);

impl Job for Counter {
    fn tag(&self) -> Tag {
        Tag::Spi
    }

    fn run(&mut self, msg: &mut Message) -> Result<(), JobError> {
        self.0 += 1;
        write!(msg, "#{}", self.0)?;
        Ok(())
    }
}

#[test]
fn sink_wakes_once_for_a_burst() {
    let k = kernel();
    let channel: &'static Channel<Message, QUEUE_DEPTH> = leak(Channel::new());
    let (mut sender, receiver) = channel.split().unwrap();
    let counters: &'static SinkCounters = leak(SinkCounters::new());
    let capture = CaptureTransport::new();

    let sink = Sink {
        kernel: k,
        inbox: Inbox::Queue(receiver),
        transport: capture.clone(),
        counters,
    };
    let sink_id = k
        .spawn(TaskConfig::new("UART", 3).stack_size(STACK), leak(sink.run()))
        .unwrap();

    k.spawn(
        TaskConfig::new("burst", 1).stack_size(STACK),
        leak(async move {
            // Both land in one slice, the sink cannot run in between.
            for text in ["one", "two"] {
                let msg = Message::line(Tag::Adc, text).unwrap();
                assert!(sender.try_send(msg).is_ok());
            }
            pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();

    // One slice to block on the empty queue, one to drain it.
    assert_eq!(k.task_info(sink_id).unwrap().stats.activations, 2);
    assert_eq!(
        capture.lines(),
        vec![BANNER, "[ADC ] one\r\n", "[ADC ] two\r\n"]
    );
    assert_eq!(counters.stats().sent, 2);
}

#[test]
fn full_queue_drops_after_the_handoff_timeout() {
    let k = kernel();
    let channel: &'static Channel<Message, QUEUE_DEPTH> = leak(Channel::new());
    // Nobody reads, but the receiver stays alive.
    let (sender, receiver) = channel.split().unwrap();
    let counters: &'static WorkerCounters = leak(WorkerCounters::new());

    let worker = Worker {
        kernel: k,
        job: Counter(0),
        activation: Activation::Periodic { period: 1 },
        handoff: Handoff::Queue(sender),
        handoff_timeout: 5,
        counters,
    };
    k.spawn(TaskConfig::new("SPI", 2).stack_size(STACK), leak(worker.run()))
        .unwrap();
    k.start().unwrap();

    // Sent at 0, 1 and 2; the fourth waits from 3 to 8.
    k.run_for(7);
    assert_eq!(counters.stats().sent, 3);
    assert_eq!(counters.stats().dropped, 0);

    k.run_for(1);
    let stats = counters.stats();
    assert_eq!(stats.sent, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(receiver.len(), QUEUE_DEPTH);
}

#[test]
fn dropped_receiver_counts_as_a_drop() {
    let k = kernel();
    let channel: &'static Channel<Message, QUEUE_DEPTH> = leak(Channel::new());
    let (sender, receiver) = channel.split().unwrap();
    drop(receiver);
    let counters: &'static WorkerCounters = leak(WorkerCounters::new());

    let worker = Worker {
        kernel: k,
        job: Counter(0),
        activation: Activation::Periodic { period: 10 },
        handoff: Handoff::Queue(sender),
        handoff_timeout: 5,
        counters,
    };
    k.spawn(TaskConfig::new("SPI", 2).stack_size(STACK), leak(worker.run()))
        .unwrap();
    k.start().unwrap();
    k.run_for(10);

    let stats = counters.stats();
    assert_eq!(stats.activations, 2);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.sent, 0);
}

#[test]
fn latest_sample_wins_between_reads() {
    let adc: &'static SimAdc = leak(SimAdc::new(Waveform::Sequence(&[100, 200, 300])));
    let cell: &'static SampleCell = leak(SampleCell::new());
    let handoff = AdcHandoff::new(adc, cell);
    let mut reader = cell.reader();

    adc.start_continuous();
    assert!(handoff.is_pending());
    handoff.on_interrupt();
    assert_eq!(reader.read().value(), Some(100));

    for _ in 0..2 {
        assert!(handoff.is_pending());
        handoff.on_interrupt();
    }

    // 200 was overwritten before anyone read it.
    assert_eq!(handoff.current_value().map(|s| s.value), Some(300));
    assert_eq!(reader.read().value(), Some(300));
    assert_eq!(reader.overruns(), 1);
    assert_eq!(handoff.invocations(), 3);
}

#[test]
fn extra_signal_without_a_sample_sends_nothing() {
    let k = kernel();
    let channel: &'static Channel<Message, QUEUE_DEPTH> = leak(Channel::new());
    let (sender, receiver) = channel.split().unwrap();
    let cell: &'static SampleCell = leak(SampleCell::new());
    let semaphore: &'static Semaphore = leak(Semaphore::binary());
    let counters: &'static WorkerCounters = leak(WorkerCounters::new());

    cell.publish(1024);
    semaphore.give();

    let worker = Worker {
        kernel: k,
        job: AdcJob::every_sample(cell.reader()),
        activation: Activation::Signal {
            semaphore,
            timeout: 100,
        },
        handoff: Handoff::Queue(sender),
        handoff_timeout: 5,
        counters,
    };
    k.spawn(TaskConfig::new("ADC", 2).stack_size(STACK), leak(worker.run()))
        .unwrap();
    k.spawn(
        TaskConfig::new("noise", 1).stack_size(STACK),
        leak(async move {
            semaphore.give();
            pending::<()>().await;
        }),
    )
    .unwrap();

    k.start().unwrap();
    k.run_for(1);

    let stats = counters.stats();
    assert_eq!(stats.activations, 2);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(receiver.len(), 1);
}
