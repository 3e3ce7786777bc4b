//! Dispatch entry points and how each one combines plugin answers.

/// How the answers of successive plugins fold into one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Every plugin runs; answers are ignored.
    Broadcast,
    /// Plugins run in registration order until one consumes the event.
    FirstResponder,
    /// Every plugin runs; the outcome is true if any plugin voted true.
    AnyVote,
}

/// Which enabled plugins an event is offered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    /// Every plugin whose type is not `BunnyPlugin`.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    HttpRequestBefore,
    HttpRequestHandle,
    HttpRequestAfter,
    XmppBunnyMessage,
    XmppVioletMessage,
    XmppVioletPacket,
    Click,
    EarsMove,
    Rfid,
    BunnyConnect,
    BunnyDisconnect,
}

impl Event {
    pub const ALL: [Event; 11] = [
        Event::HttpRequestBefore,
        Event::HttpRequestHandle,
        Event::HttpRequestAfter,
        Event::XmppBunnyMessage,
        Event::XmppVioletMessage,
        Event::XmppVioletPacket,
        Event::Click,
        Event::EarsMove,
        Event::Rfid,
        Event::BunnyConnect,
        Event::BunnyDisconnect,
    ];

    /// Hook name, used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Event::HttpRequestBefore => "http_request_before",
            Event::HttpRequestHandle => "http_request_handle",
            Event::HttpRequestAfter => "http_request_after",
            Event::XmppBunnyMessage => "xmpp_bunny_message",
            Event::XmppVioletMessage => "xmpp_violet_message",
            Event::XmppVioletPacket => "xmpp_violet_packet",
            Event::Click => "on_click",
            Event::EarsMove => "on_ears_move",
            Event::Rfid => "on_rfid",
            Event::BunnyConnect => "on_bunny_connect",
            Event::BunnyDisconnect => "on_bunny_disconnect",
        }
    }

    pub fn combine(self) -> Combine {
        match self {
            Event::HttpRequestHandle | Event::Click | Event::EarsMove | Event::Rfid => {
                Combine::FirstResponder
            }
            Event::XmppVioletPacket => Combine::AnyVote,
            _ => Combine::Broadcast,
        }
    }

    pub fn audience(self) -> Audience {
        match self {
            Event::HttpRequestBefore | Event::HttpRequestHandle | Event::HttpRequestAfter => {
                Audience::All
            }
            _ => Audience::System,
        }
    }

    /// Whether the device's own bunny plugins get the event after the
    /// system plugins.
    pub fn reaches_device_plugins(self) -> bool {
        matches!(
            self,
            Event::Click
                | Event::EarsMove
                | Event::Rfid
                | Event::BunnyConnect
                | Event::BunnyDisconnect
        )
    }
}
