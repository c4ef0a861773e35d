//! WASM/Web-specific WebSocket implementation using web_sys::WebSocket.

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use huddle_shared::{ClientCommand, ServerEvent, WsEnvelope};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, MessageEvent, WebSocket};

use super::{ConnectionState, WsHandle};

/// How long to wait for the socket to open.
const OPEN_TIMEOUT_MS: u32 = 5000;
const OPEN_POLL_MS: u32 = 10;

/// A WebSocket connection to the relay (WASM implementation)
pub struct WsConnection {
    handle: WsHandle,
}

impl WsConnection {
    /// Start connecting to `url`. Commands sent through [`Self::handle`]
    /// before the socket is open are queued and written once it is.
    pub fn open(
        url: impl Into<String>,
        on_event: impl Fn(WsEnvelope<ServerEvent>) + 'static,
        on_state: impl Fn(ConnectionState) + 'static,
    ) -> Self {
        let (handle, receiver) = WsHandle::channel(url);
        spawn_local(run_connection(
            handle.url.clone(),
            receiver,
            Rc::new(on_event),
            Rc::new(on_state),
        ));
        Self { handle }
    }

    /// Get a handle for sending commands
    pub fn handle(&self) -> WsHandle {
        self.handle.clone()
    }

    /// Close the connection (idempotent).
    pub fn close(&self) {
        self.handle.close();
    }
}

async fn run_connection(
    url: String,
    mut receiver: UnboundedReceiver<WsEnvelope<ClientCommand>>,
    on_event: Rc<dyn Fn(WsEnvelope<ServerEvent>)>,
    on_state: Rc<dyn Fn(ConnectionState)>,
) {
    on_state(ConnectionState::Connecting);

    let ws = match connect_websocket(&url, on_event).await {
        Ok(ws) => ws,
        Err(reason) => {
            crate::log_error!("WebSocket error for {}: {}", url, reason);
            on_state(ConnectionState::Failed { reason });
            return;
        }
    };

    on_state(ConnectionState::Connected);
    crate::log_info!("WebSocket connected to {}", url);

    // Close handler reports the end of the connection, once
    let reported = Rc::new(RefCell::new(false));
    let report_closed = {
        let reported = reported.clone();
        let on_state = on_state.clone();
        let url = url.clone();
        move || {
            if !reported.replace(true) {
                crate::log_info!("WebSocket to {} closed", url);
                on_state(ConnectionState::Disconnected);
            }
        }
    };
    let report_on_close = report_closed.clone();
    let onclose_callback = Closure::wrap(Box::new(move |_: CloseEvent| {
        report_on_close();
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    // Send loop; ends when the handle is closed
    while let Some(cmd) = receiver.next().await {
        // readyState 1 = OPEN
        if ws.ready_state() != 1 {
            crate::log_info!("WebSocket no longer open, stopping send loop");
            break;
        }
        match cmd.encode() {
            Ok(json) => {
                if let Err(e) = ws.send_with_str(&json) {
                    crate::log_error!("Send failed: {:?}", e);
                }
            }
            Err(e) => crate::log_error!("Serialize failed: {}", e),
        }
    }

    let _ = ws.close();
    report_closed();
}

/// Create the socket, install the message/error handlers and wait for it to
/// open.
async fn connect_websocket(
    url: &str,
    on_event: Rc<dyn Fn(WsEnvelope<ServerEvent>)>,
) -> Result<WebSocket, String> {
    let ws = WebSocket::new(url).map_err(|e| format!("Failed to create WebSocket: {:?}", e))?;

    let is_open = Rc::new(RefCell::new(false));
    let error_reason = Rc::new(RefCell::new(None::<String>));

    let is_open_clone = is_open.clone();
    let onopen_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
        *is_open_clone.borrow_mut() = true;
    }) as Box<dyn FnMut(web_sys::Event)>);
    ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
    onopen_callback.forget();

    let error_reason_close = error_reason.clone();
    let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("Code {}", e.code())
        } else {
            e.reason()
        };
        *error_reason_close.borrow_mut() = Some(reason);
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    let error_reason_err = error_reason.clone();
    let onerror_callback = Closure::wrap(Box::new(move |_: web_sys::ErrorEvent| {
        crate::log_error!("WebSocket onerror fired");
        *error_reason_err.borrow_mut() = Some("WebSocket error".to_string());
    }) as Box<dyn FnMut(web_sys::ErrorEvent)>);
    ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
    onerror_callback.forget();

    let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
            let text: String = text.into();
            match WsEnvelope::<ServerEvent>::decode(&text) {
                Ok(event) => on_event(event),
                Err(e) => crate::log_warn!("Ignoring frame: {}", e),
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
    onmessage_callback.forget();

    for _ in 0..(OPEN_TIMEOUT_MS / OPEN_POLL_MS) {
        if *is_open.borrow() {
            return Ok(ws);
        }
        if let Some(reason) = error_reason.borrow().clone() {
            return Err(reason);
        }
        // Yield to allow callbacks to fire
        gloo_timers::future::TimeoutFuture::new(OPEN_POLL_MS).await;
    }

    let _ = ws.close();
    Err("Connection timeout".to_string())
}
