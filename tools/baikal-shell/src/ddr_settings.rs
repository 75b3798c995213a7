//! `ddr-settings`: view and edit the per-port DDR tuning record.

use anyhow::Result;
use baikal_efi::EfiStatus;
use baikal_flash::ddr::{DdrParam, DisplayValue, RECORD_LEN};
use baikal_flash::layout::DdrSettingsRegion;
use baikal_flash::{DdrSettings, FlashDevice, update_region};

use crate::cli::DdrSettingsArgs;
use crate::status::StatusContext;

/// Field edits requested on the command line, in record order.
fn requested_values(args: &DdrSettingsArgs) -> [(DdrParam, Option<&str>); 6] {
    [
        (DdrParam::Dic, args.dic.as_deref()),
        (DdrParam::RttWr, args.rttwr.as_deref()),
        (DdrParam::RttNom, args.rttnom.as_deref()),
        (DdrParam::RttPark, args.rttpark.as_deref()),
        (DdrParam::PhyOdt, args.phyodt.as_deref()),
        (DdrParam::PhyOdi, args.phyodi.as_deref()),
    ]
}

/// Flash offset of `port`'s record.
fn port_offset(region: &DdrSettingsRegion, port: u32) -> Result<u64, EfiStatus> {
    region.port_offset(port).ok_or(EfiStatus::INVALID_PARAMETER)
}

/// Parses one field value.
fn parse_value(param: DdrParam, text: &str) -> Result<u8, EfiStatus> {
    param.parse(text).map_err(EfiStatus::from)
}

fn print_record(port: u32, settings: &DdrSettings) {
    println!("DDR port {port}:");
    for param in DdrParam::ALL {
        println!("  {:<8} {}", param.name(), DisplayValue(settings.get(param)));
    }
}

/// Applies `args` to the record of `args.port`.
///
/// Every value is validated before flash is touched, and the record is only
/// rewritten when it changes. With no edits the record is printed.
pub fn run<D: FlashDevice>(
    dev: &mut D,
    region: &DdrSettingsRegion,
    args: &DdrSettingsArgs,
) -> Result<DdrSettings> {
    let port = args.port;
    let offset = port_offset(region, port).status_context(format_args!(
        "port {port} out of range (board has {} DDR ports)",
        region.ports
    ))?;

    let mut edits = Vec::new();
    for (param, text) in requested_values(args) {
        if let Some(text) = text {
            let value = parse_value(param, text)
                .status_context(format_args!("invalid --{} value `{text}`", param.name()))?;
            edits.push((param, value));
        }
    }
    let show = args.show || (edits.is_empty() && !args.clear);

    let mut raw = [0u8; RECORD_LEN];
    dev.read(offset, &mut raw)
        .status_context(format_args!("reading DDR port {port} record"))?;
    let stored = DdrSettings::from_bytes(&raw).status_context("decoding DDR record")?;

    let mut settings = if args.clear {
        DdrSettings::unset()
    } else {
        stored
    };
    for (param, value) in edits {
        settings
            .set(param, value)
            .status_context(format_args!("setting {}", param.name()))?;
    }

    if settings != stored {
        update_region(dev, offset, &settings.to_bytes())
            .status_context(format_args!("writing DDR port {port} record"))?;
        log::info!("DDR port {port} record updated at {offset:#x}");
    }

    if show {
        print_record(port, &settings);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_of;
    use baikal_flash::FlashMap;
    use baikal_smc::abi::BAIKAL_SMC_FLASH_ERASE;
    use baikal_smc::{FlashEmulator, SmcFlash};

    const REGION: DdrSettingsRegion = FlashMap::BM1000.ddr_settings;

    fn flash() -> SmcFlash<FlashEmulator> {
        SmcFlash::new(FlashEmulator::new(4096, 256))
    }

    fn args(port: u32) -> DdrSettingsArgs {
        DdrSettingsArgs {
            port,
            dic: None,
            rttwr: None,
            rttnom: None,
            rttpark: None,
            phyodt: None,
            phyodi: None,
            show: false,
            clear: false,
        }
    }

    fn record(flash: &SmcFlash<FlashEmulator>, port: u32) -> &[u8] {
        let at = usize::try_from(REGION.port_offset(port).unwrap()).unwrap();
        &flash.conduit().contents()[at..at + RECORD_LEN]
    }

    #[test]
    fn edit_keeps_unspecified_fields() {
        let mut flash = flash();
        let mut first = args(1);
        first.dic = Some("48".into());
        first.rttnom = Some("off".into());
        run(&mut flash, &REGION, &first).unwrap();

        let mut second = args(1);
        second.rttwr = Some("hiz".into());
        let settings = run(&mut flash, &REGION, &second).unwrap();

        assert_eq!(settings.get(DdrParam::Dic), Some(48));
        assert_eq!(settings.get(DdrParam::RttNom), Some(0));
        assert_eq!(settings.get(DdrParam::RttWr), Some(0xFE));
        assert_eq!(record(&flash, 1)[..4], [48, 0xFE, 0, 0xFF]);
        assert!(record(&flash, 0).iter().all(|&b| b == 0xFF));
        assert!(flash.conduit().is_locked());
    }

    #[test]
    fn clear_resets_to_sentinels() {
        let mut flash = flash();
        let mut set = args(0);
        set.phyodt = Some("60".into());
        run(&mut flash, &REGION, &set).unwrap();

        let mut clear = args(0);
        clear.clear = true;
        assert!(run(&mut flash, &REGION, &clear).unwrap().is_unset());
        assert!(record(&flash, 0).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn show_alone_does_not_write() {
        let mut flash = flash();
        let mut show = args(0);
        show.show = true;
        assert!(run(&mut flash, &REGION, &show).unwrap().is_unset());
        assert_eq!(flash.conduit().call_count(BAIKAL_SMC_FLASH_ERASE), 0);
    }

    #[test]
    fn bad_port_is_invalid_parameter() {
        let err = run(&mut flash(), &REGION, &args(2)).unwrap_err();
        assert_eq!(status_of(&err), Some(EfiStatus::INVALID_PARAMETER));
    }

    #[test]
    fn bad_value_leaves_flash_untouched() {
        let mut flash = flash();
        let mut bad = args(0);
        bad.dic = Some("40".into());
        bad.rttwr = Some("120".into());
        let err = run(&mut flash, &REGION, &bad).unwrap_err();
        assert_eq!(status_of(&err), Some(EfiStatus::INVALID_PARAMETER));
        assert!(err.to_string().contains("--dic"));
        assert_eq!(flash.conduit().total_calls(), 0);
    }
}
