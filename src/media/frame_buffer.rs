//! Reassembly of irregular byte chunks into fixed-size frames.
//!
//! Producers hand over owned chunks of any length; the consumer pulls frames
//! of exactly `frame_size` bytes. A chunk that straddles two frames is kept
//! in place and only the read offset into it moves, so every byte is copied
//! once, into the frame that carries it.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

#[derive(Debug)]
pub struct FrameBuffer {
    chunks: VecDeque<Vec<u8>>,
    // bytes of `chunks[0]` already delivered
    head_offset: usize,
    buffered: usize,
    frame_size: NonZeroUsize,
}

impl FrameBuffer {
    pub fn new(frame_size: NonZeroUsize) -> Self {
        Self { chunks: VecDeque::new(), head_offset: 0, buffered: 0, frame_size }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size.get()
    }

    /// Bytes pushed but not yet handed out in a frame.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Appends a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Returns the next frame, or `None` while fewer than `frame_size` bytes
    /// are buffered. A `None` leaves the buffer untouched.
    pub fn try_extract_frame(&mut self) -> Option<Vec<u8>> {
        let frame_size = self.frame_size.get();
        if self.buffered < frame_size {
            return None;
        }

        let mut frame = Vec::with_capacity(frame_size);
        while frame.len() < frame_size {
            let Some(head) = self.chunks.front() else {
                break;
            };
            let available = &head[self.head_offset..];
            let need = frame_size - frame.len();

            if available.len() <= need {
                frame.extend_from_slice(available);
                self.chunks.pop_front();
                self.head_offset = 0;
            } else {
                frame.extend_from_slice(&available[..need]);
                self.head_offset += need;
            }
        }

        debug_assert_eq!(frame.len(), frame_size);
        self.buffered -= frame_size;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn buffer(frame_size: usize) -> FrameBuffer {
        FrameBuffer::new(NonZeroUsize::new(frame_size).unwrap())
    }

    #[test]
    fn chunks_3_5_2_with_frame_4() {
        let mut fb = buffer(4);
        fb.push(vec![0, 1, 2]);
        fb.push(vec![3, 4, 5, 6, 7]);
        fb.push(vec![8, 9]);
        assert_eq!(fb.buffered(), 10);

        assert_eq!(fb.try_extract_frame(), Some(vec![0, 1, 2, 3]));
        assert_eq!(fb.buffered(), 6);

        assert_eq!(fb.try_extract_frame(), Some(vec![4, 5, 6, 7]));
        assert_eq!(fb.buffered(), 2);

        assert_eq!(fb.try_extract_frame(), None);
        assert_eq!(fb.buffered(), 2);
    }

    #[test]
    fn not_enough_data_does_not_mutate() {
        let mut fb = buffer(8);
        fb.push(vec![1, 2, 3]);
        assert_eq!(fb.try_extract_frame(), None);
        assert_eq!(fb.try_extract_frame(), None);
        assert_eq!(fb.buffered(), 3);

        fb.push(vec![4, 5, 6, 7, 8]);
        assert_eq!(fb.try_extract_frame(), Some(vec![1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(fb.buffered(), 0);
    }

    #[test]
    fn empty_chunk_is_noop() {
        let mut fb = buffer(2);
        fb.push(Vec::new());
        assert_eq!(fb.buffered(), 0);
        assert_eq!(fb.try_extract_frame(), None);

        fb.push(vec![7]);
        fb.push(Vec::new());
        fb.push(vec![9]);
        assert_eq!(fb.buffered(), 2);
        assert_eq!(fb.try_extract_frame(), Some(vec![7, 9]));
    }

    #[test]
    fn one_chunk_spans_many_frames() {
        let mut fb = buffer(3);
        fb.push((0u8..10).collect());
        assert_eq!(fb.try_extract_frame(), Some(vec![0, 1, 2]));
        assert_eq!(fb.try_extract_frame(), Some(vec![3, 4, 5]));
        assert_eq!(fb.try_extract_frame(), Some(vec![6, 7, 8]));
        assert_eq!(fb.try_extract_frame(), None);
        assert_eq!(fb.buffered(), 1);
    }

    #[test]
    fn random_chunking_matches_contiguous_slicing() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        for frame_size in [1usize, 4, 7, 160, 1920] {
            let stream: Vec<u8> = (0..10_000).map(|_| rng.random()).collect();
            let mut fb = buffer(frame_size);
            let mut out = Vec::new();

            let mut pos = 0;
            while pos < stream.len() {
                let len = rng.random_range(0..=2 * frame_size).min(stream.len() - pos);
                fb.push(stream[pos..pos + len].to_vec());
                pos += len;

                while let Some(frame) = fb.try_extract_frame() {
                    assert_eq!(frame.len(), frame_size);
                    out.push(frame);
                }
            }

            let expected: Vec<&[u8]> = stream.chunks_exact(frame_size).collect();
            assert_eq!(out.len(), expected.len(), "frame_size {frame_size}");
            for (got, want) in out.iter().zip(expected) {
                assert_eq!(got.as_slice(), want);
            }
            assert_eq!(fb.buffered(), stream.len() % frame_size);
        }
    }
}
