use std::{
    iter::Enumerate,
    slice::ChunksMut,
    sync::{Mutex, MutexGuard},
};

use super::image_utils::FrameBuffer;

/**
 * Hands out disjoint, fixed-size ranges of a linear buffer to whichever worker asks
 * first. Each range is exclusively borrowed by the worker that pulled it.
 */
pub struct WorkCursor<'a, T> {
    ranges: Mutex<Enumerate<ChunksMut<'a, T>>>,
    range_size: usize,
}

impl<'a, T> WorkCursor<'a, T> {
    pub fn new(buffer: &'a mut [T], range_size: usize) -> WorkCursor<'a, T> {
        assert!(range_size > 0);
        WorkCursor {
            ranges: Mutex::new(buffer.chunks_mut(range_size).enumerate()),
            range_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Enumerate<ChunksMut<'a, T>>> {
        // the critical section cannot panic, so a poisoned cursor is still consistent
        match self.ranges.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// @return: the linear index of the first element and the range itself, or None
    /// once the whole buffer has been handed out.
    pub fn next_range(&self) -> Option<(usize, &'a mut [T])> {
        let (range_index, range) = self.lock().next()?;
        Some((range_index * self.range_size, range))
    }
}

/**
 * Evaluate `per_pixel(x, y)` for every pixel of a `width` x `height` frame.
 *
 * With `thread_count <= 1` the frame is swept column by column on the calling thread.
 * Otherwise `thread_count` scoped workers repeatedly pull ranges of `width` linear
 * indices (`index = x * height + y`) from a shared cursor, and write their results
 * straight into the frame. All workers are joined before returning. The result does
 * not depend on the thread count.
 */
pub fn compute_frame<T, F>(
    width: u32,
    height: u32,
    thread_count: usize,
    per_pixel: F,
) -> FrameBuffer<T>
where
    T: Clone + Default + Send,
    F: Fn(u32, u32) -> T + Sync,
{
    let mut frame = FrameBuffer::new(width, height, T::default());
    if width == 0 || height == 0 {
        return frame;
    }

    if thread_count <= 1 {
        for x in 0..width {
            for y in 0..height {
                frame.set(x, y, per_pixel(x, y));
            }
        }
        return frame;
    }

    let column_height = height as usize;
    {
        let cursor = WorkCursor::new(frame.as_mut_slice(), width as usize);
        let cursor = &cursor;
        let per_pixel = &per_pixel;

        std::thread::scope(|scope| {
            for _ in 0..thread_count {
                scope.spawn(move || {
                    while let Some((first_index, range)) = cursor.next_range() {
                        for (offset, value) in range.iter_mut().enumerate() {
                            let index = first_index + offset;
                            *value = per_pixel(
                                (index / column_height) as u32,
                                (index % column_height) as u32,
                            );
                        }
                    }
                });
            }
        });
    }

    log::debug!(
        "computed {}x{} frame on {} worker threads",
        width,
        height,
        thread_count
    );
    frame
}
