// Lock-free communication channels

use crate::messaging::command::SinkCommand;
use ringbuf::{HeapRb, traits::Split};

pub type SinkCommandProducer = ringbuf::HeapProd<SinkCommand>;
pub type SinkCommandConsumer = ringbuf::HeapCons<SinkCommand>;

pub fn create_sink_channel(capacity: usize) -> (SinkCommandProducer, SinkCommandConsumer) {
    let rb = HeapRb::<SinkCommand>::new(capacity);
    rb.split()
}
