//! Growable deinterleaved frame buffer.
//!
//! A [`FrameBuffer`] owns one contiguous backing store holding every channel
//! back to back: channel `c` lives at `c * frame_capacity ..
//! (c + 1) * frame_capacity`. Channel views are handed out as borrowed slices
//! computed from the current store on every call, so a reallocation can never
//! leave a stale view behind.

use thiserror::Error;

use crate::convert;

/// Errors raised by [`FrameBuffer`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// More frames were offered than the buffer has room for. Nothing was copied.
    #[error("buffer overrun: {requested} frames requested, {remaining} frames of space remaining")]
    CapacityExceeded { requested: usize, remaining: usize },

    /// A reallocation was requested while unconsumed frames were still buffered.
    #[error("cannot reallocate while {buffered} frames are still buffered")]
    ReallocateWhileBuffered { buffered: usize },

    /// Interleaved input did not contain a whole number of frames.
    #[error("{samples} samples is not a whole number of {channels}-channel frames")]
    PartialFrame { samples: usize, channels: usize },
}

/// Deinterleaved multi-channel sample buffer with monotonic capacity.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    /// Backing store, `channels * frame_capacity` samples.
    data: Vec<f32>,
    channels: usize,
    frame_capacity: usize,
    frames_buffered: usize,
}

impl FrameBuffer {
    /// Create an empty buffer with no capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of channels the buffer was last allocated for.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Allocated frames per channel.
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Valid frames currently held.
    pub fn frames_buffered(&self) -> usize {
        self.frames_buffered
    }

    /// Free space in frames.
    pub fn remaining(&self) -> usize {
        self.frame_capacity - self.frames_buffered
    }

    /// Returns true if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.frames_buffered == 0
    }

    /// (Re)allocate the backing store for `frame_capacity` frames of `channels` channels.
    ///
    /// Previous contents are discarded and `frames_buffered` is reset to zero.
    /// The buffer must be logically empty: reallocating over unconsumed frames
    /// fails with [`BufferError::ReallocateWhileBuffered`] instead of losing them.
    pub fn allocate(&mut self, frame_capacity: usize, channels: usize) -> Result<(), BufferError> {
        if self.frames_buffered > 0 {
            return Err(BufferError::ReallocateWhileBuffered {
                buffered: self.frames_buffered,
            });
        }

        self.data = vec![0.0; frame_capacity * channels];
        self.channels = channels;
        self.frame_capacity = frame_capacity;
        self.frames_buffered = 0;
        Ok(())
    }

    /// Make sure the buffer can hold `frames` frames of `channels` channels.
    ///
    /// Capacity only ever grows: when a reallocation is needed (too small, or the
    /// channel count changed) the new capacity is the larger of `frames` and the
    /// current capacity. Returns `true` if the store was reallocated.
    pub fn ensure_capacity(&mut self, frames: usize, channels: usize) -> Result<bool, BufferError> {
        if self.frame_capacity >= frames && self.channels == channels {
            return Ok(false);
        }

        let capacity = frames.max(self.frame_capacity);
        self.allocate(capacity, channels)?;
        Ok(true)
    }

    /// Deinterleave `interleaved` onto the end of the buffered frames.
    ///
    /// Returns the number of frames appended. If the input does not fit in the
    /// remaining space nothing is copied and [`BufferError::CapacityExceeded`]
    /// is returned; the sizing step upstream is expected to make this unreachable.
    pub fn append(&mut self, interleaved: &[f32]) -> Result<usize, BufferError> {
        if interleaved.is_empty() {
            return Ok(0);
        }
        if self.channels == 0 || interleaved.len() % self.channels != 0 {
            return Err(BufferError::PartialFrame {
                samples: interleaved.len(),
                channels: self.channels,
            });
        }

        let frames = interleaved.len() / self.channels;
        if frames > self.remaining() {
            return Err(BufferError::CapacityExceeded {
                requested: frames,
                remaining: self.remaining(),
            });
        }

        let start = self.frames_buffered;
        let capacity = self.frame_capacity;
        let mut views: Vec<&mut [f32]> = self
            .data
            .chunks_exact_mut(capacity)
            .map(|channel| &mut channel[start..start + frames])
            .collect();
        convert::deinterleave(interleaved, &mut views, frames);

        self.frames_buffered += frames;
        Ok(frames)
    }

    /// Interleave the first `frames` buffered frames into `output`.
    ///
    /// The caller guarantees `frames <= frames_buffered()` and that `output`
    /// holds `frames * channels()` samples.
    pub fn fetch(&self, output: &mut [f32], frames: usize) {
        debug_assert!(frames <= self.frames_buffered);
        convert::interleave(&self.views(frames), output, frames);
    }

    /// Mark `frames` frames written directly through [`FrameBuffer::views_mut`] as buffered.
    pub fn commit(&mut self, frames: usize) -> Result<(), BufferError> {
        if frames > self.remaining() {
            return Err(BufferError::CapacityExceeded {
                requested: frames,
                remaining: self.remaining(),
            });
        }
        self.frames_buffered += frames;
        Ok(())
    }

    /// Drop all buffered frames, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.frames_buffered = 0;
    }

    /// Full-capacity view of one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.frame_capacity;
        &self.data[start..start + self.frame_capacity]
    }

    /// Per-channel views of the first `frames` frames.
    pub fn views(&self, frames: usize) -> Vec<&[f32]> {
        assert!(frames <= self.frame_capacity, "view past frame capacity");
        (0..self.channels)
            .map(|c| {
                let start = c * self.frame_capacity;
                &self.data[start..start + frames]
            })
            .collect()
    }

    /// Mutable per-channel views of the first `frames` frames.
    pub fn views_mut(&mut self, frames: usize) -> Vec<&mut [f32]> {
        assert!(frames <= self.frame_capacity, "view past frame capacity");
        if self.frame_capacity == 0 {
            return (0..self.channels).map(|_| <&mut [f32]>::default()).collect();
        }
        self.data
            .chunks_exact_mut(self.frame_capacity)
            .map(|channel| &mut channel[..frames])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = FrameBuffer::new();
        assert_eq!(buf.frame_capacity(), 0);
        assert_eq!(buf.frames_buffered(), 0);
        assert_eq!(buf.channels(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_allocate_lays_out_channels_contiguously() {
        let mut buf = FrameBuffer::new();
        buf.allocate(4, 2).unwrap();

        buf.append(&[1.0, 10.0, 2.0, 20.0]).unwrap();

        assert_eq!(buf.channel(0), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(buf.channel(1), &[10.0, 20.0, 0.0, 0.0]);
        assert_eq!(buf.frames_buffered(), 2);
        assert_eq!(buf.remaining(), 2);
    }

    #[test]
    fn test_append_continues_after_buffered_frames() {
        let mut buf = FrameBuffer::new();
        buf.allocate(4, 2).unwrap();

        buf.append(&[1.0, -1.0]).unwrap();
        buf.append(&[2.0, -2.0, 3.0, -3.0]).unwrap();

        let views = buf.views(3);
        assert_eq!(views[0], &[1.0, 2.0, 3.0]);
        assert_eq!(views[1], &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_append_overrun_copies_nothing() {
        let mut buf = FrameBuffer::new();
        buf.allocate(2, 1).unwrap();
        buf.append(&[1.0]).unwrap();

        let err = buf.append(&[2.0, 3.0]).unwrap_err();

        assert_eq!(
            err,
            BufferError::CapacityExceeded {
                requested: 2,
                remaining: 1
            }
        );
        assert_eq!(buf.frames_buffered(), 1);
        assert_eq!(buf.channel(0), &[1.0, 0.0]);
    }

    #[test]
    fn test_append_rejects_partial_frame() {
        let mut buf = FrameBuffer::new();
        buf.allocate(8, 2).unwrap();

        let err = buf.append(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            BufferError::PartialFrame {
                samples: 3,
                channels: 2
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reallocate_while_buffered_is_refused() {
        let mut buf = FrameBuffer::new();
        buf.allocate(4, 1).unwrap();
        buf.append(&[0.5]).unwrap();

        let err = buf.allocate(16, 1).unwrap_err();
        assert_eq!(err, BufferError::ReallocateWhileBuffered { buffered: 1 });
        assert_eq!(buf.frame_capacity(), 4);

        buf.clear();
        buf.allocate(16, 1).unwrap();
        assert_eq!(buf.frame_capacity(), 16);
    }

    #[test]
    fn test_ensure_capacity_never_shrinks() {
        let mut buf = FrameBuffer::new();

        assert!(buf.ensure_capacity(4096, 2).unwrap());
        assert!(!buf.ensure_capacity(512, 2).unwrap());
        assert_eq!(buf.frame_capacity(), 4096);

        assert!(buf.ensure_capacity(10000, 2).unwrap());
        assert_eq!(buf.frame_capacity(), 10000);

        // Channel change reallocates but keeps the larger capacity
        assert!(buf.ensure_capacity(100, 6).unwrap());
        assert_eq!(buf.frame_capacity(), 10000);
        assert_eq!(buf.channels(), 6);
    }

    #[test]
    fn test_fetch_interleaves_prefix() {
        let mut buf = FrameBuffer::new();
        buf.allocate(3, 2).unwrap();
        buf.append(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        let mut out = [0.0; 4];
        buf.fetch(&mut out, 2);

        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_views_mut_then_commit() {
        let mut buf = FrameBuffer::new();
        buf.allocate(4, 2).unwrap();

        {
            let mut views = buf.views_mut(2);
            views[0].copy_from_slice(&[1.0, 2.0]);
            views[1].copy_from_slice(&[3.0, 4.0]);
        }
        buf.commit(2).unwrap();

        let mut out = [0.0; 4];
        buf.fetch(&mut out, 2);
        assert_eq!(out, [1.0, 3.0, 2.0, 4.0]);

        assert!(buf.commit(3).is_err());
    }

    #[test]
    fn test_views_of_unallocated_buffer() {
        let mut buf = FrameBuffer::new();
        buf.allocate(0, 2).unwrap();

        assert_eq!(buf.views(0).len(), 2);
        assert_eq!(buf.views_mut(0).len(), 2);
        assert_eq!(buf.append(&[]).unwrap(), 0);
    }
}
