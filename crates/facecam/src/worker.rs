//! Worker threads and one-shot promises connecting them.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block.
    let (sender, recv) = channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This method does not block or fail. If the connected [`PromiseHandle`] was dropped, `value`
    /// is dropped as well.
    pub fn fulfill(self, value: T) {
        self.inner.send(value).ok();
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
pub struct PromiseHandle<T> {
    recv: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Blocks the calling thread until the [`Promise`] is fulfilled.
    ///
    /// If the [`Promise`] is dropped without being fulfilled (typically because the thread holding
    /// it panicked), an error is returned instead.
    pub fn block(self) -> Result<T, PromiseDropped> {
        self.recv.recv().map_err(|_| PromiseDropped { _priv: () })
    }
}

/// An error returned by [`PromiseHandle::block`] indicating that the connected [`Promise`] object
/// was dropped without being fulfilled.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

impl std::fmt::Display for PromiseDropped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("promise dropped without being fulfilled")
    }
}

impl std::error::Error for PromiseDropped {}

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: usize,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread(s).
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the channel capacity of the [`Worker`].
    ///
    /// By default, a capacity of 0 is used, which means that [`Worker::send`] will block until a
    /// worker thread picks up the message.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Spawns a single [`Worker`] thread that uses `handler` to process incoming messages in
    /// order.
    pub fn spawn<I, F>(self, handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let mut handler = Some(handler);
        self.spawn_pool(1, |_| handler.take().expect("single worker spawned twice"))
    }

    /// Spawns `threads` worker threads sharing one channel.
    ///
    /// Each thread gets its own handler, created by calling `make_handler` with the thread's
    /// index. Messages go to whichever thread is idle, so they may be processed out of order.
    ///
    /// # Panics
    ///
    /// This method will panic if `threads` is 0.
    pub fn spawn_pool<I, F, M>(self, threads: usize, mut make_handler: M) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
        M: FnMut(usize) -> F,
    {
        assert!(threads > 0, "worker pool needs at least one thread");

        let (sender, recv) = channel::bounded(self.capacity);
        let mut worker = Worker {
            sender: Some(sender),
            handles: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let name = match (&self.name, threads) {
                (Some(name), 1) => Some(name.clone()),
                (Some(name), _) => Some(format!("{name} #{index}")),
                (None, _) => None,
            };

            let mut builder = thread::Builder::new();
            if let Some(name) = name.clone() {
                builder = builder.name(name);
            }
            let recv = recv.clone();
            let mut handler = make_handler(index);
            // If spawning fails, dropping `worker` joins the threads spawned so far.
            let handle = builder.spawn(move || {
                if let Some(name) = &name {
                    log::trace!("worker '{name}' starting");
                }
                for message in recv {
                    handler(message);
                }
                if let Some(name) = &name {
                    log::trace!("worker '{name}' exiting");
                }
            })?;
            worker.handles.push(handle);
        }

        Ok(worker)
    }
}

/// A handle to one or more worker threads processing messages of type `I`.
///
/// When dropped, the channel to the threads will be closed and the threads will be joined once
/// every sender (including [`Mailbox`]es) is gone. If a thread has panicked, the panic will be
/// forwarded to the thread dropping the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handles: Vec<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // Close the channel to signal the threads to exit.
        drop(self.sender.take());

        self.wait_for_exit();
    }
}

impl Worker<()> {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: 0,
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn wait_for_exit(&mut self) {
        let mut payload = None;
        for handle in self.handles.drain(..) {
            if let Err(p) = handle.join() {
                payload.get_or_insert(p);
            }
        }
        if let Some(payload) = payload {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }

    /// Sends a message to the worker thread(s).
    ///
    /// This will block until there is room in the channel.
    ///
    /// If the workers have panicked, this will propagate the panic to the calling thread.
    pub fn send(&mut self, msg: I) {
        let sender = self.sender.as_ref().expect("sender is only taken on drop");
        if sender.send(msg).is_err() {
            self.wait_for_exit();
        }
    }

    /// Returns a cloneable handle that other threads can use to send messages to this worker.
    ///
    /// The worker threads will keep running until all [`Mailbox`]es are dropped.
    pub fn mailbox(&self) -> Mailbox<I> {
        Mailbox {
            inner: self
                .sender
                .clone()
                .expect("sender is only taken on drop"),
        }
    }
}

/// A cloneable sending handle to a [`Worker`], obtained from [`Worker::mailbox`].
pub struct Mailbox<I> {
    inner: Sender<I>,
}

impl<I> Clone for Mailbox<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> Mailbox<I> {
    /// Sends a message to the worker, blocking until there is room in the channel.
    ///
    /// Returns the message back if the worker is gone.
    pub fn send(&self, msg: I) -> Result<(), I> {
        self.inner.send(msg).map_err(|e| e.into_inner())
    }
}
