//! Exports the pairing coordinator as an `org.bluez.Agent1` object.

use dbus::channel::MatchingReceiver;
use dbus::message::MatchRule;
use dbus::nonblock::SyncConnection;
use dbus::Path;
use dbus_crossroads::{Crossroads, IfaceBuilder, MethodErr};
use std::sync::Arc;

use crate::agent::PairingCoordinator;
use crate::error::{Error, RejectReason};

const AGENT_INTERFACE: &str = "org.bluez.Agent1";
const BLUEZ_ERROR_REJECTED: &str = "org.bluez.Error.Rejected";
const BLUEZ_ERROR_CANCELED: &str = "org.bluez.Error.Canceled";

type MethodResult<T> = std::result::Result<T, MethodErr>;

/// Serves agent calls at `path` on `conn`. Callbacks that wait on the operator run on
/// the blocking pool so the connection keeps dispatching, which lets `Cancel` through.
pub fn export_agent(conn: &Arc<SyncConnection>, path: &str, coordinator: Arc<PairingCoordinator>) {
    let mut cr = Crossroads::new();
    cr.set_async_support(Some((
        conn.clone(),
        Box::new(|x| {
            tokio::spawn(x);
        }),
    )));

    let display = coordinator.clone();
    let confirm = coordinator.clone();

    let token = cr.register(AGENT_INTERFACE, move |b: &mut IfaceBuilder<Arc<PairingCoordinator>>| {
        b.method("Release", (), (), |_, agent, _: ()| {
            agent.release().map_err(method_err)
        });

        b.method(
            "RequestPinCode",
            ("device",),
            ("pincode",),
            |_, agent, (device,): (Path<'static>,)| {
                agent
                    .request_pin_code(&device)
                    .map(|pin| (pin,))
                    .map_err(method_err)
            },
        );

        b.method(
            "DisplayPinCode",
            ("device", "pincode"),
            (),
            |_, agent, (device, pin): (Path<'static>, String)| {
                agent.display_pin_code(&device, &pin).map_err(method_err)
            },
        );

        b.method(
            "RequestPasskey",
            ("device",),
            ("passkey",),
            |_, agent, (device,): (Path<'static>,)| {
                agent
                    .request_passkey(&device)
                    .map(|passkey| (passkey,))
                    .map_err(method_err)
            },
        );

        let display = display.clone();
        b.method_with_cr_async(
            "DisplayPasskey",
            ("device", "passkey", "entered"),
            (),
            move |mut ctx, _cr, (device, passkey, entered): (Path<'static>, u32, u16)| {
                let agent = display.clone();
                let device = device.to_string();
                async move {
                    let result =
                        blocking(move || agent.display_passkey(&device, passkey, entered)).await;
                    ctx.reply(result)
                }
            },
        );

        let confirm = confirm.clone();
        b.method_with_cr_async(
            "RequestConfirmation",
            ("device", "passkey"),
            (),
            move |mut ctx, _cr, (device, passkey): (Path<'static>, u32)| {
                let agent = confirm.clone();
                let device = device.to_string();
                async move {
                    let result =
                        blocking(move || agent.request_confirmation(&device, passkey)).await;
                    ctx.reply(result)
                }
            },
        );

        b.method(
            "RequestAuthorization",
            ("device",),
            (),
            |_, agent, (device,): (Path<'static>,)| {
                agent.request_authorization(&device).map_err(method_err)
            },
        );

        b.method(
            "AuthorizeService",
            ("device", "uuid"),
            (),
            |_, agent, (device, uuid): (Path<'static>, String)| {
                agent.authorize_service(&device, &uuid).map_err(method_err)
            },
        );

        b.method("Cancel", (), (), |_, agent, _: ()| {
            agent.cancel().map_err(method_err)
        });
    });

    cr.insert(path.to_string(), &[token], coordinator);

    conn.start_receive(
        MatchRule::new_method_call(),
        Box::new(move |msg, conn| {
            if cr.handle_message(msg, conn).is_err() {
                tracing::warn!("Agent could not handle an incoming method call");
            }
            true
        }),
    );

    tracing::debug!("Pairing agent exported at {}", path);
}

async fn blocking<F>(f: F) -> MethodResult<()>
where
    F: FnOnce() -> crate::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(method_err),
        Err(e) => Err(MethodErr::failed(&e)),
    }
}

fn method_err(err: Error) -> MethodErr {
    let message = err.to_string();
    match err {
        Error::PairingRejected(RejectReason::Denied) => {
            MethodErr::from((BLUEZ_ERROR_REJECTED, message))
        }
        Error::PairingRejected(RejectReason::Cancelled) | Error::PairingTimedOut(_) => {
            MethodErr::from((BLUEZ_ERROR_CANCELED, message))
        }
        other => MethodErr::failed(&other),
    }
}
