//! Temporary class-C multicast detour shared by the application packages.

use embedded_io_async::Write;
use log::warn;
use rak3172_async::at::lorawan::{DeviceClass, MulticastGroup};
use rak3172_async::{Error, Rak3172};

/// Switches the device to class C and registers the group.
///
/// Returns the class to restore afterwards.
pub(crate) async fn enter<W: Write>(
    radio: &mut Rak3172<'_, W>,
    group: Option<&MulticastGroup>,
) -> Result<Option<DeviceClass>, Error<W::Error>> {
    let Some(group) = group else {
        return Ok(None);
    };
    let prior = radio.class().await?;
    if prior != DeviceClass::C {
        radio.set_class(DeviceClass::C).await?;
    }
    radio.add_multicast_group(group).await?;
    Ok(Some(prior))
}

/// Deregisters the group and restores the saved class. Failures are logged
/// and swallowed so the caller's own result survives.
pub(crate) async fn restore<W: Write>(
    radio: &mut Rak3172<'_, W>,
    group: Option<&MulticastGroup>,
    prior: Option<DeviceClass>,
) {
    let Some(group) = group else {
        return;
    };
    if let Err(err) = radio.remove_multicast_group(&group.dev_addr).await {
        warn!("could not deregister multicast group: {err:?}");
    }
    if let Some(class) = prior {
        if class != DeviceClass::C {
            if let Err(err) = radio.set_class(class).await {
                warn!("could not restore device class {class:?}: {err:?}");
            }
        }
    }
}
