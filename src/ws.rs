// src/ws.rs
//
// Per-user push channel. `WsHub` owns the registry of open sockets; sessions
// register on start and deregister when they stop, so nothing global is kept.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Recipient};
use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::AppState;
use crate::api::auth::decode_user_id;

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Message)]
#[rtype(result = "()")]
pub struct WsMessage(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub user_id: String,
    pub session_id: usize,
    pub addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub user_id: String,
    pub session_id: usize,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct NotifyUser {
    pub user_id: String,
    pub event: PushEvent,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: LibraryGrantedData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryGrantedData {
    pub product_id: i32,
    pub product_name: String,
    pub payment_id: String,
}

impl PushEvent {
    pub fn library_granted(product_id: i32, product_name: String, payment_id: String) -> Self {
        Self {
            kind: "library.granted",
            data: LibraryGrantedData {
                product_id,
                product_name,
                payment_id,
            },
        }
    }
}

#[derive(Default)]
pub struct WsHub {
    sessions: HashMap<String, HashMap<usize, Recipient<WsMessage>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for WsHub {
    type Context = actix::Context<Self>;
}

impl Handler<Connect> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) -> Self::Result {
        self.sessions
            .entry(msg.user_id)
            .or_default()
            .insert(msg.session_id, msg.addr);
    }
}

impl Handler<Disconnect> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) -> Self::Result {
        if let Some(user_sessions) = self.sessions.get_mut(&msg.user_id) {
            user_sessions.remove(&msg.session_id);
            if user_sessions.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<NotifyUser> for WsHub {
    type Result = ();

    fn handle(&mut self, msg: NotifyUser, _: &mut Self::Context) -> Self::Result {
        let Some(user_sessions) = self.sessions.get(&msg.user_id) else {
            return;
        };
        match serde_json::to_string(&msg.event) {
            Ok(payload) => {
                for addr in user_sessions.values() {
                    addr.do_send(WsMessage(payload.clone()));
                }
            }
            Err(e) => log::error!("push event encode error: {e}"),
        }
    }
}

struct WsSession {
    user_id: String,
    session_id: usize,
    hub: actix::Addr<WsHub>,
}

impl WsSession {
    fn new(user_id: String, hub: actix::Addr<WsHub>) -> Self {
        Self {
            user_id,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            hub,
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Connect {
            user_id: self.user_id.clone(),
            session_id: self.session_id,
            addr: ctx.address().recipient(),
        });
        ctx.text(r#"{"type":"connected","message":"Push notifications active"}"#);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            user_id: self.user_id.clone(),
            session_id: self.session_id,
        });
    }
}

impl Handler<WsMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.0);
    }
}

impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("push socket error user_id={}: {e}", self.user_id);
                ctx.stop();
            }
        }
    }
}

#[derive(Deserialize)]
struct WsQuery {
    token: String,
}

#[get("/push-notifications")]
pub async fn push_notifications(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = serde_urlencoded::from_str::<WsQuery>(req.query_string())
        .ok()
        .map(|q| q.token)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return Err(actix_web::error::ErrorUnauthorized("Missing token"));
    };

    let user_id = decode_user_id(&state.config.jwt_secret, &token)
        .map_err(|_| actix_web::error::ErrorUnauthorized("Invalid token"))?;
    ws::start(WsSession::new(user_id, state.ws_hub.clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::MessageResult;

    /// Number of open sessions for a user.
    #[derive(Message)]
    #[rtype(result = "usize")]
    struct SessionCount {
        user_id: String,
    }

    impl Handler<SessionCount> for WsHub {
        type Result = MessageResult<SessionCount>;

        fn handle(&mut self, msg: SessionCount, _: &mut Self::Context) -> Self::Result {
            MessageResult(self.sessions.get(&msg.user_id).map_or(0, HashMap::len))
        }
    }

    struct Sink;

    impl Actor for Sink {
        type Context = actix::Context<Self>;
    }

    impl Handler<WsMessage> for Sink {
        type Result = ();

        fn handle(&mut self, _: WsMessage, _: &mut Self::Context) -> Self::Result {}
    }

    #[actix_web::test]
    async fn sessions_register_and_deregister() {
        let hub = WsHub::new().start();
        let sink = Sink.start();

        for session_id in [1, 2] {
            hub.send(Connect {
                user_id: "u1".into(),
                session_id,
                addr: sink.clone().recipient(),
            })
            .await
            .unwrap();
        }
        let count = hub.send(SessionCount { user_id: "u1".into() }).await.unwrap();
        assert_eq!(count, 2);

        hub.send(Disconnect {
            user_id: "u1".into(),
            session_id: 1,
        })
        .await
        .unwrap();
        hub.send(Disconnect {
            user_id: "u1".into(),
            session_id: 2,
        })
        .await
        .unwrap();
        let count = hub.send(SessionCount { user_id: "u1".into() }).await.unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn library_granted_event_shape() {
        let event = PushEvent::library_granted(3, "Course".into(), "pay_abc".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "library.granted");
        assert_eq!(json["data"]["productId"], 3);
        assert_eq!(json["data"]["paymentId"], "pay_abc");
    }
}
