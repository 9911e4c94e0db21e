//! # Double Buffer
//!
//! Front/back pair for stencil passes that must read a stable snapshot while
//! writing the next generation.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────┐        ┌──────────────┐
//!        │    front     │  read  │     back     │
//!        │ (pass N - 1) │ ─────► │   (pass N)   │
//!        └──────────────┘        └──────────────┘
//!                 ▲                      │
//!                 └────── swap() ◄───────┘
//! ```

/// Two equally sized buffers: a readable front and a writable back.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleBuffer<T> {
    front: Vec<T>,
    back: Vec<T>,
}

impl<T: Clone> DoubleBuffer<T> {
    /// Wraps `front`; the back buffer starts as a copy of it.
    #[must_use]
    pub fn new(front: Vec<T>) -> Self {
        let back = front.clone();
        Self { front, back }
    }

    /// Copies the front buffer into the back buffer.
    ///
    /// Useful when a pass only rewrites some tiles and the rest must carry
    /// over unchanged.
    pub fn sync_back(&mut self) {
        self.back.clone_from(&self.front);
    }
}

impl<T> DoubleBuffer<T> {
    /// Current generation.
    #[inline]
    #[must_use]
    pub fn front(&self) -> &[T] {
        &self.front
    }

    /// Write access to the current generation, for in-place fixups between
    /// passes.
    #[inline]
    pub fn front_mut(&mut self) -> &mut [T] {
        &mut self.front
    }

    /// Read access to the front and write access to the back, at once.
    #[inline]
    pub fn split(&mut self) -> (&[T], &mut [T]) {
        (&self.front, &mut self.back)
    }

    /// Promotes the back buffer to the front.
    #[inline]
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    /// Consumes the pair, keeping the front buffer.
    #[must_use]
    pub fn into_front(self) -> Vec<T> {
        self.front
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_promotes_back() {
        let mut buffers = DoubleBuffer::new(vec![1, 2, 3]);
        {
            let (front, back) = buffers.split();
            for (dst, src) in back.iter_mut().zip(front) {
                *dst = src * 10;
            }
        }
        assert_eq!(buffers.front(), &[1, 2, 3]);
        buffers.swap();
        assert_eq!(buffers.front(), &[10, 20, 30]);
    }

    #[test]
    fn test_stencil_reads_previous_generation() {
        // Each cell becomes the sum of its left neighbor and itself.
        let mut buffers = DoubleBuffer::new(vec![1, 1, 1, 1]);
        let (front, back) = buffers.split();
        for i in 1..front.len() {
            back[i] = front[i - 1] + front[i];
        }
        buffers.swap();
        assert_eq!(buffers.into_front(), vec![1, 2, 2, 2]);
    }

    #[test]
    fn test_sync_back_copies_front() {
        let mut buffers = DoubleBuffer::new(vec![0u8; 3]);
        let (_, back) = buffers.split();
        back[1] = 7;
        buffers.swap();
        buffers.sync_back();
        let (front, back) = buffers.split();
        assert_eq!(front, back);
    }

    #[test]
    fn test_front_mut_edits_current_generation() {
        let mut buffers = DoubleBuffer::new(vec![1.5f32, -2.0]);
        for v in buffers.front_mut() {
            *v = v.clamp(0.0, 1.0);
        }
        assert_eq!(buffers.front(), &[1.0, 0.0]);
        buffers.swap();
        assert_eq!(buffers.front(), &[1.5, -2.0]);
    }
}
