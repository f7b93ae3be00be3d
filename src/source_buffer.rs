// src/source_buffer.rs
//
// Double-buffered source stream.
//
// Two slots hold decoded chunks. One slot is playing; the other holds the
// chunk that follows it. Chunks are published by the control side as
// `Arc`s and retired back to it, so the audio thread never frees memory.

use std::sync::Arc;

use crate::format::SourceChunk;
use crate::state::LoopMode;

/// Result of moving the read position by one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Playback goes on (possibly in the other slot).
    Continue,
    /// End reached in last-loop mode.
    Finished,
}

/// Two alternating chunk slots plus the read position.
///
/// Owned by the audio thread.
#[derive(Default)]
pub struct SourceBuffers {
    slots: [Option<Arc<SourceChunk>>; 2],

    /// Slot currently playing
    play_index: usize,

    /// Frame offset of the next analysis window in the playing slot
    current_offset: usize,
}

impl SourceBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a chunk. It fills the playing slot if that is empty,
    /// otherwise the other slot. Returns the chunk it replaced.
    pub fn push(&mut self, chunk: Arc<SourceChunk>) -> Option<Arc<SourceChunk>> {
        let target = if self.slots[self.play_index].is_none() {
            self.play_index
        } else {
            1 - self.play_index
        };
        self.slots[target].replace(chunk)
    }

    /// True once the playing slot has data.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.slots[self.play_index].is_some()
    }

    #[inline]
    pub fn play_index(&self) -> usize {
        self.play_index
    }

    #[inline]
    pub fn current_offset(&self) -> usize {
        self.current_offset
    }

    /// Number of loaded slots.
    pub fn loaded_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Slot that follows `index`: the other one when loaded, else itself.
    #[inline]
    fn next_of(&self, index: usize) -> usize {
        if self.slots[1 - index].is_some() { 1 - index } else { index }
    }

    /// Copy the next analysis window: `pcm.len()` samples and
    /// `codes.len() / 2` frames of direction codes, wrapping into the
    /// following slot at the end of the playing one.
    ///
    /// Returns false (leaving the outputs untouched) when nothing is loaded.
    pub fn read_window(&self, pcm: &mut [f32], codes: &mut [u8]) -> bool {
        if !self.is_loaded() {
            return false;
        }
        self.copy_frames(|c| &c.pcm, 1, pcm);
        self.copy_frames(|c| &c.codes, 2, codes);
        true
    }

    fn copy_frames<T: Copy>(&self, field: impl Fn(&SourceChunk) -> &[T], per_frame: usize, out: &mut [T]) {
        let mut index = self.play_index;
        let mut pos = self.current_offset * per_frame;
        let mut written = 0;

        while written < out.len() {
            let Some(chunk) = self.slots[index].as_deref() else {
                return;
            };
            let src = field(chunk);
            if src.is_empty() {
                return;
            }
            if pos < src.len() {
                let n = (src.len() - pos).min(out.len() - written);
                out[written..written + n].copy_from_slice(&src[pos..pos + n]);
                written += n;
            }
            index = self.next_of(index);
            pos = 0;
        }
    }

    /// Move the read position forward by `hop` frames.
    ///
    /// Crossing into the next chunk in `Continue` mode keeps the frames
    /// past the end of the old chunk instead of restarting at offset 0.
    /// For chunks that are a whole number of hops long both are the same.
    pub fn advance(&mut self, hop: usize, mode: LoopMode) -> Advance {
        let len = self.slots[self.play_index]
            .as_ref()
            .map(|c| c.frames())
            .unwrap_or(0);

        let next = self.current_offset + hop;
        if next < len {
            self.current_offset = next;
            return Advance::Continue;
        }

        match mode {
            LoopMode::Continue => {
                self.play_index = self.next_of(self.play_index);
                let next_len = self.slots[self.play_index]
                    .as_ref()
                    .map(|c| c.frames())
                    .unwrap_or(0);
                // Carry the remainder; zero for hop-aligned chunks.
                let remainder = next - len;
                self.current_offset = if remainder < next_len { remainder } else { 0 };
                Advance::Continue
            }
            LoopMode::LastLoop => Advance::Finished,
        }
    }

    /// Back to the first slot, offset 0.
    pub fn rewind(&mut self) {
        self.current_offset = 0;
        if self.slots[0].is_some() {
            self.play_index = 0;
        }
    }
}
