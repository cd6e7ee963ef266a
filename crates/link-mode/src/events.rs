//! Notifications from link-mode to the UI layer

use alacritty_terminal::event::{Event as AlacEvent, EventListener};

/// Events sent from a link-mode session to the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UrlModeEvent {
    /// Labels or highlighted cells changed.
    Redraw,
    /// A session started with this many labelled targets.
    Entered(usize),
    /// The session ended; the UI should drop its snapshot.
    Exited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BackpressurePolicy {
    DropWhenFull,
    KeepLatestWhenFull,
}

fn backpressure_policy(event: &UrlModeEvent) -> BackpressurePolicy {
    match event {
        UrlModeEvent::Redraw => BackpressurePolicy::DropWhenFull,
        UrlModeEvent::Entered(_) | UrlModeEvent::Exited => BackpressurePolicy::KeepLatestWhenFull,
    }
}

/// Sending half of the link-mode event channel.
#[derive(Clone, Debug)]
pub struct EventProxy {
    sender: smol::channel::Sender<UrlModeEvent>,
}

impl EventProxy {
    pub fn new(sender: smol::channel::Sender<UrlModeEvent>) -> Self {
        Self { sender }
    }

    /// A proxy plus the receiver the UI polls.
    pub fn channel(capacity: usize) -> (Self, smol::channel::Receiver<UrlModeEvent>) {
        let (sender, receiver) = smol::channel::bounded(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn send(&self, event: UrlModeEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(smol::channel::TrySendError::Full(event)) => {
                if matches!(
                    backpressure_policy(&event),
                    BackpressurePolicy::KeepLatestWhenFull
                ) {
                    let _ = self.sender.force_send(event);
                }
            }
            Err(smol::channel::TrySendError::Closed(_)) => {}
        }
    }
}

/// Terminal output arriving during a session only needs a repaint; the
/// session keeps working on its snapshot.
impl EventListener for EventProxy {
    fn send_event(&self, event: AlacEvent) {
        if matches!(event, AlacEvent::Wakeup | AlacEvent::MouseCursorDirty) {
            self.send(UrlModeEvent::Redraw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventProxy, UrlModeEvent};
    use alacritty_terminal::event::{Event as AlacEvent, EventListener};

    #[test]
    fn redraws_are_dropped_when_the_channel_is_full() {
        let (proxy, receiver) = EventProxy::channel(1);

        proxy.send(UrlModeEvent::Redraw);
        proxy.send(UrlModeEvent::Redraw);

        assert_eq!(receiver.try_recv(), Ok(UrlModeEvent::Redraw));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn exit_is_kept_when_the_channel_is_full() {
        let (proxy, receiver) = EventProxy::channel(1);

        proxy.send(UrlModeEvent::Redraw);
        proxy.send(UrlModeEvent::Exited);

        let mut saw_exit = false;
        while let Ok(event) = receiver.try_recv() {
            saw_exit |= event == UrlModeEvent::Exited;
        }
        assert!(saw_exit, "exit event should not be dropped when queue is full");
    }

    #[test]
    fn terminal_wakeups_become_redraws() {
        let (proxy, receiver) = EventProxy::channel(4);

        proxy.send_event(AlacEvent::Wakeup);
        proxy.send_event(AlacEvent::Bell);

        assert_eq!(receiver.try_recv(), Ok(UrlModeEvent::Redraw));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn sending_after_the_receiver_is_gone_is_silent() {
        let (proxy, receiver) = EventProxy::channel(1);
        drop(receiver);

        proxy.send(UrlModeEvent::Exited);
    }
}
