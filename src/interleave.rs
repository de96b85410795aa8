//! DTS interleaving of packets from independent streams

use crate::rational::compare_ts;
use crate::{Error, Packet, Rational, Result};
use std::cmp::Ordering;
use std::collections::VecDeque;

struct Queued {
    packet: Packet,
    time_base: Rational,
}

/// Per-stream packet queues merged into one DTS-ordered output.
///
/// Each stream keeps its pending packets sorted by DTS (arrival order for
/// equal DTS). A packet only becomes ready once every declared stream has
/// something queued, because until then a smaller DTS may still arrive on
/// the empty stream.
#[derive(Default)]
pub struct InterleaveScheduler {
    queues: Vec<VecDeque<Queued>>,
    buffered: usize,
    max_buffered: Option<usize>,
    last_written: Option<(i64, Rational)>,
}

impl InterleaveScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of queued packets. Past the bound the smallest packet
    /// is released even if some stream is still empty.
    pub fn with_max_buffered(max_buffered: Option<usize>) -> Self {
        Self {
            max_buffered,
            ..Self::default()
        }
    }

    /// Declare one more stream; it takes the next position
    pub fn add_stream(&mut self) {
        self.queues.push(VecDeque::new());
    }

    pub fn num_streams(&self) -> usize {
        self.queues.len()
    }

    /// Number of packets waiting to be written
    pub fn len(&self) -> usize {
        self.buffered
    }

    pub fn is_empty(&self) -> bool {
        self.buffered == 0
    }

    /// Queue `packet` behind the other pending packets of its stream.
    ///
    /// Packets whose DTS is behind the last packet released are rejected with
    /// [`Error::LateDts`], since writing them would break DTS order.
    pub fn push(&mut self, packet: Packet, time_base: Rational) -> Result<()> {
        let queue = self
            .queues
            .get_mut(packet.stream)
            .ok_or(Error::InvalidStream(packet.stream))?;

        if let Some((last, last_base)) = self.last_written {
            if compare_ts(packet.dts, time_base, last, last_base) == Ordering::Less {
                return Err(Error::LateDts {
                    stream: packet.stream,
                    dts: packet.dts,
                    last: last_base.rescale(last, time_base),
                });
            }
        }

        // stable insert: after every queued packet with DTS <= ours
        let at = queue
            .iter()
            .rposition(|q| q.packet.dts <= packet.dts)
            .map_or(0, |i| i + 1);
        queue.insert(at, Queued { packet, time_base });
        self.buffered += 1;
        Ok(())
    }

    /// Next packet that can be written without risking DTS order, if any.
    ///
    /// The packet stays queued until [`InterleaveScheduler::pop_front`] is
    /// called for its stream, so a failed write can be retried.
    pub fn peek_ready(&self) -> Option<&Packet> {
        let stalled = self.queues.iter().any(|q| q.is_empty());
        let over_limit = self.max_buffered.is_some_and(|max| self.buffered > max);

        if stalled && !over_limit {
            return None;
        }
        if stalled {
            log::debug!(
                "Interleave queue holds {} packets, releasing the smallest DTS early",
                self.buffered
            );
        }
        self.peek_any()
    }

    /// Smallest queued packet regardless of empty streams. Used to drain at the end.
    pub fn peek_any(&self) -> Option<&Packet> {
        let mut best: Option<&Queued> = None;
        for head in self.queues.iter().filter_map(|q| q.front()) {
            let better = match best {
                None => true,
                // strictly smaller only, so the lower position wins ties
                Some(current) => {
                    compare_ts(head.packet.dts, head.time_base, current.packet.dts, current.time_base)
                        == Ordering::Less
                }
            };
            if better {
                best = Some(head);
            }
        }
        best.map(|queued| &queued.packet)
    }

    /// Remove the head packet of `stream` after it was written
    pub fn pop_front(&mut self, stream: usize) -> Option<Packet> {
        let queued = self.queues.get_mut(stream)?.pop_front()?;
        self.buffered -= 1;
        self.last_written = Some((queued.packet.dts, queued.time_base));
        Some(queued.packet)
    }

    pub fn pop_ready(&mut self) -> Option<Packet> {
        let stream = self.peek_ready()?.stream;
        self.pop_front(stream)
    }

    pub fn pop_any(&mut self) -> Option<Packet> {
        let stream = self.peek_any()?.stream;
        self.pop_front(stream)
    }

    /// Remove every queued packet in merge order
    pub fn drain(&mut self) -> Vec<Packet> {
        std::iter::from_fn(|| self.pop_any()).collect()
    }
}
