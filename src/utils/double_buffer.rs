use std::{ops::Deref, sync::Arc, thread};

use crossbeam_queue::ArrayQueue;

// -------------------------------------------------------------------------------------------------

/// Shared state of a front/back buffer pair: single slot queues which move the two instances
/// between the reader and the writer without locking.
struct Exchange<T> {
    /// A completely written back instance, waiting to be picked up by the reader.
    published: ArrayQueue<T>,
    /// The reader's previous front instance, waiting to be overwritten by the writer.
    recycled: ArrayQueue<T>,
}

// -------------------------------------------------------------------------------------------------

/// Create a new double buffer from two preallocated instances of the same shape.
///
/// The [`FrontBuffer`] is meant to live in the real-time reader. It never locks, blocks or
/// allocates. The [`BackBuffer`] lives in the writer thread: it only ever writes into the
/// instance the reader does not see, and publishes it as a whole when writing succeeded.
pub fn double_buffer<T: Send>(front: T, back: T) -> (FrontBuffer<T>, BackBuffer<T>) {
    let exchange = Arc::new(Exchange {
        published: ArrayQueue::new(1),
        recycled: ArrayQueue::new(1),
    });
    (
        FrontBuffer {
            current: front,
            exchange: Arc::clone(&exchange),
        },
        BackBuffer {
            spare: Some(back),
            exchange,
        },
    )
}

// -------------------------------------------------------------------------------------------------

/// Reader side of a double buffer. Derefs to the current front instance.
pub struct FrontBuffer<T> {
    current: T,
    exchange: Arc<Exchange<T>>,
}

impl<T> FrontBuffer<T> {
    /// Access the current front instance.
    #[inline]
    pub fn get(&self) -> &T {
        &self.current
    }

    /// Swap in the latest published instance, if any, and hand the old front back to the writer.
    ///
    /// Returns true when the front instance changed.
    pub fn update(&mut self) -> bool {
        if let Some(mut published) = self.exchange.published.pop() {
            std::mem::swap(&mut self.current, &mut published);
            let recycled = self.exchange.recycled.push(published).is_ok();
            debug_assert!(recycled, "Double buffer should only ever manage two instances");
            true
        } else {
            false
        }
    }
}

impl<T> Deref for FrontBuffer<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.current
    }
}

// -------------------------------------------------------------------------------------------------

/// Writer side of a double buffer.
pub struct BackBuffer<T> {
    spare: Option<T>,
    exchange: Arc<Exchange<T>>,
}

impl<T> BackBuffer<T> {
    /// Write into the back instance and publish it when the given writer succeeds.
    ///
    /// A publish which the reader did not pick up yet gets reclaimed and overwritten (latest
    /// wins). When the writer fails, nothing gets published and the reader keeps its front.
    /// Writers thus must validate their input before they start mutating the instance.
    pub fn write<R, E, F>(&mut self, writer: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let (mut instance, reclaimed) = self.acquire();
        match writer(&mut instance) {
            Ok(result) => {
                self.publish(instance);
                Ok(result)
            }
            Err(err) => {
                if reclaimed {
                    self.publish(instance);
                } else {
                    self.spare = Some(instance);
                }
                Err(err)
            }
        }
    }

    /// True when a published instance has not yet been picked up by the reader.
    #[cfg(test)]
    fn is_pending(&self) -> bool {
        !self.exchange.published.is_empty()
    }

    fn acquire(&mut self) -> (T, bool) {
        if let Some(spare) = self.spare.take() {
            return (spare, false);
        }
        loop {
            if let Some(published) = self.exchange.published.pop() {
                return (published, true);
            }
            if let Some(recycled) = self.exchange.recycled.pop() {
                return (recycled, false);
            }
            // the reader is in the middle of an update
            thread::yield_now();
        }
    }

    fn publish(&mut self, instance: T) {
        if let Err(instance) = self.exchange.published.push(instance) {
            debug_assert!(false, "Double buffer should only ever manage two instances");
            self.spare = Some(instance);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn publish_and_update() {
        let (mut front, mut back) = double_buffer(vec![0; 4], vec![0; 4]);
        assert!(!front.update());

        back.write(|data| {
            data.fill(1);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(back.is_pending());
        assert_eq!(front.as_slice(), &[0; 4]);
        assert!(front.update());
        assert_eq!(front.as_slice(), &[1; 4]);
        assert!(!back.is_pending());

        // the writer receives the old front instance
        back.write(|data| {
            assert_eq!(data.as_slice(), &[0; 4]);
            data.fill(2);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(front.update());
        assert_eq!(front.get().as_slice(), &[2; 4]);
    }

    #[test]
    fn latest_publish_wins() {
        let (mut front, mut back) = double_buffer(0, 0);
        for value in 1..=5 {
            back.write(|data| {
                *data = value;
                Ok::<_, ()>(())
            })
            .unwrap();
        }
        assert!(front.update());
        assert_eq!(*front, 5);
        assert!(!front.update());
    }

    #[test]
    fn failed_writes_never_publish() {
        let (mut front, mut back) = double_buffer(1, 1);
        let result = back.write(|_| Err::<(), _>("failed"));
        assert_eq!(result, Err("failed"));
        assert!(!back.is_pending());
        assert!(!front.update());
        assert_eq!(*front, 1);

        // a failed write does not drop a pending publish
        back.write(|data| {
            *data = 2;
            Ok::<_, ()>(())
        })
        .unwrap();
        assert!(back.write(|_| Err::<(), _>(())).is_err());
        assert!(front.update());
        assert_eq!(*front, 2);
    }

    #[test]
    fn concurrent_readers_never_see_partial_writes() {
        const LEN: usize = 4096;
        let (mut front, mut back) = double_buffer(vec![0_usize; LEN], vec![0_usize; LEN]);

        let done = Arc::new(AtomicBool::new(false));
        let writer = thread::spawn({
            let done = Arc::clone(&done);
            move || {
                for generation in 1..=500 {
                    back.write(|data| {
                        for value in data.iter_mut() {
                            *value = generation;
                        }
                        Ok::<_, ()>(())
                    })
                    .unwrap();
                }
                done.store(true, Ordering::Release);
            }
        });

        let mut last_generation = 0;
        while !done.load(Ordering::Acquire) || front.update() {
            front.update();
            let generation = front[0];
            assert!(front.iter().all(|v| *v == generation));
            assert!(generation >= last_generation);
            last_generation = generation;
        }
        writer.join().unwrap();
        front.update();
        assert_eq!(front[0], 500);
    }
}
