// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::Message;

type Release = Box<dyn FnOnce() + Send>;

struct InboxState {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    release: Mutex<Option<Release>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Ephemeral reply subject shared by a reply stream, its timer and the
/// subscription feeding it. Closing is idempotent.
#[derive(Clone)]
pub struct Inbox {
    state: Arc<InboxState>,
}

impl Inbox {
    pub fn new(name: &str) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = Inbox {
            state: Arc::new(InboxState {
                name: name.to_string(),
                sender: Mutex::new(Some(tx)),
                release: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        };
        (inbox, rx)
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Callback run once when the inbox closes, typically the unsubscribe.
    pub fn on_close(&self, release: impl FnOnce() + Send + 'static) {
        *self.state.release.lock() = Some(Box::new(release));
    }

    /// Forward a reply to the stream. Dropped once the inbox is closed.
    pub fn deliver(&self, msg: Message) {
        if let Some(tx) = self.state.sender.lock().as_ref() {
            let _ = tx.send(msg);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.sender.lock().is_none()
    }

    /// Close the inbox after `timeout`, unless it is closed earlier.
    pub fn arm_timer(&self, timeout: Duration) {
        let weak: Weak<InboxState> = Arc::downgrade(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(state) = weak.upgrade() {
                debug!(inbox = %state.name, "inbox timer expired");
                Inbox::release(&state);
            }
        });
        *self.state.timer.lock() = Some(handle);
    }

    pub fn close(&self) {
        if let Some(timer) = self.state.timer.lock().take() {
            timer.abort();
        }
        Inbox::release(&self.state);
    }

    fn release(state: &InboxState) {
        // dropping the sender ends the stream once buffered replies are read
        state.sender.lock().take();
        let release = state.release.lock().take();
        if let Some(release) = release {
            debug!(inbox = %state.name, "closing inbox");
            release();
        }
    }
}

/// Lazy stream of replies to a `request_many`. Ends on timeout, after the
/// reply limit is reached, or when nobody was listening. Dropping the stream
/// releases the inbox.
pub struct ReplyStream {
    inbox: Inbox,
    receiver: mpsc::UnboundedReceiver<Message>,
    limit: Option<usize>,
    received: usize,
    no_responders: bool,
}

impl ReplyStream {
    pub fn new(
        inbox: Inbox,
        receiver: mpsc::UnboundedReceiver<Message>,
        limit: Option<usize>,
    ) -> Self {
        ReplyStream {
            inbox,
            receiver,
            limit: limit.filter(|l| *l > 0),
            received: 0,
            no_responders: false,
        }
    }

    /// A stream that never yields because no subscriber matched the request.
    pub fn no_responders(inbox: Inbox, receiver: mpsc::UnboundedReceiver<Message>) -> Self {
        inbox.close();
        ReplyStream {
            inbox,
            receiver,
            limit: None,
            received: 0,
            no_responders: true,
        }
    }

    pub fn is_no_responders(&self) -> bool {
        self.no_responders
    }

    pub fn inbox(&self) -> &str {
        self.inbox.name()
    }

    pub fn close(&mut self) {
        self.inbox.close();
        self.receiver.close();
    }
}

impl Stream for ReplyStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        let this = self.get_mut();

        if let Some(limit) = this.limit
            && this.received >= limit
        {
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(msg)) => {
                this.received += 1;
                if let Some(limit) = this.limit
                    && this.received >= limit
                {
                    this.close();
                }
                Poll::Ready(Some(msg))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        self.inbox.close();
    }
}
