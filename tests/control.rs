mod common;

use common::Rig;
use stk1160::format::{self, FieldOrder, Format};
use stk1160::standard::{self, Family};
use stk1160::{reg, CapabilityFlags, Config, Error, FourCC, StdId};

fn frame_window(family: Family) -> Vec<(u16, u16)> {
    reg::sequence(family.registers())
        .map(|r| (r.reg, r.val))
        .collect()
}

#[test]
fn attach_programs_default_standard() {
    let rig = Rig::new();

    assert_eq!(rig.usb.writes(), frame_window(Family::Lines525));
    assert_eq!(rig.decoder.calls(), vec![String::from("s_std 0x1000")]);

    let session = rig.dev.open();
    assert_eq!(session.standard(), standard::DEFAULT);
    let fmt = session.format();
    assert_eq!((fmt.width, fmt.height), (720, 480));
}

#[test]
fn capabilities() {
    let rig = Rig::new();
    let caps = rig.dev.open().query_caps().unwrap();

    assert_eq!(caps.driver, "stk1160");
    assert_eq!(caps.bus, "usb-mock-1");
    assert!(caps.capabilities.contains(CapabilityFlags::VIDEO_CAPTURE));
    assert!(caps.capabilities.contains(CapabilityFlags::STREAMING));
}

#[test]
fn single_packed_format() {
    let rig = Rig::new();
    let session = rig.dev.open();

    let desc = session.enum_formats(0).unwrap();
    assert_eq!(desc.fourcc, format::UYVY);
    assert!(matches!(
        session.enum_formats(1),
        Err(Error::InvalidArgument(_))
    ));

    let fmt = session.format();
    assert_eq!(fmt.fourcc, FourCC::new(b"UYVY"));
    assert_eq!(fmt.field_order, FieldOrder::Interlaced);
    assert_eq!(fmt.stride, 720 * 2);
    assert_eq!(fmt.size, 720 * 480 * 2);
}

#[test]
fn try_format_keeps_geometry() {
    let rig = Rig::new();
    let session = rig.dev.open();

    let fmt = session
        .try_format(&Format::new(320, 240, format::UYVY))
        .unwrap();
    assert_eq!((fmt.width, fmt.height), (720, 480));

    let yuyv = Format::new(720, 480, FourCC::new(b"YUYV"));
    assert!(matches!(
        session.try_format(&yuyv),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        session.set_format(&yuyv),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn second_session_is_refused_until_release() {
    let rig = Rig::new();
    let a = rig.dev.open();
    let b = rig.dev.open();

    a.set_standard(StdId::PAL_BG).unwrap();

    assert!(matches!(b.set_standard(StdId::NTSC), Err(Error::Busy)));
    assert!(matches!(b.set_input(1), Err(Error::Busy)));
    assert!(matches!(b.request_buffers(4), Err(Error::Busy)));
    assert!(matches!(b.stream_on(), Err(Error::Busy)));
    assert!(matches!(b.query_buffer(0), Err(Error::Busy)));

    // read-only queries stay available
    assert_eq!(b.standard(), StdId::PAL_BG);
    assert_eq!(b.format().height, 576);

    // releasing the buffers gives up ownership
    a.request_buffers(0).unwrap();
    b.set_input(2).unwrap();
    assert!(matches!(a.set_input(0), Err(Error::Busy)));
}

#[test]
fn closing_owner_releases_device() {
    let rig = Rig::new();
    let a = rig.dev.open();
    let b = rig.dev.open();

    a.request_buffers(8).unwrap();
    assert!(matches!(b.request_buffers(8), Err(Error::Busy)));

    a.close();
    assert_eq!(rig.dev.queue().count(), 0);
    assert_eq!(b.request_buffers(8).unwrap().len(), 8);
}

#[test]
fn closing_other_session_keeps_owner() {
    let rig = Rig::new();
    let a = rig.dev.open();
    let b = rig.dev.open();

    a.request_buffers(8).unwrap();
    drop(b);
    assert_eq!(rig.dev.queue().count(), 8);
    assert!(a.query_buffer(7).is_ok());
}

#[test]
fn standard_selects_geometry_and_registers() {
    let rig = Rig::new();
    let session = rig.dev.open();
    rig.usb.clear();

    session.set_standard(StdId::PAL_BG).unwrap();
    assert_eq!(session.format().height, 576);
    assert_eq!(rig.usb.writes(), frame_window(Family::Lines625));
    assert_eq!(
        rig.decoder.calls().last().map(String::as_str),
        Some("s_std 0x7")
    );

    session.set_standard(StdId::NTSC_M).unwrap();
    assert_eq!(session.format().height, 480);
}

#[test]
fn unsupported_standard_changes_nothing() {
    let rig = Rig::new();
    let session = rig.dev.open();
    session.set_standard(StdId::SECAM_L).unwrap();
    rig.usb.clear();
    let calls = rig.decoder.calls().len();

    assert!(matches!(
        session.set_standard(StdId::ATSC_8_VSB),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(session.standard(), StdId::SECAM_L);
    assert_eq!(session.format().height, 576);
    assert!(rig.usb.writes().is_empty());
    assert_eq!(rig.decoder.calls().len(), calls);
}

#[test]
fn register_failure_aborts_standard_switch() {
    let rig = Rig::new();
    let session = rig.dev.open();
    rig.usb.clear();
    let calls = rig.decoder.calls().len();

    rig.usb.fail_write_at(3);
    assert!(matches!(
        session.set_standard(StdId::PAL),
        Err(Error::Transport(_))
    ));
    // the writes before the failure stay applied
    assert_eq!(rig.usb.writes().len(), 2);
    assert_eq!(rig.decoder.calls().len(), calls);

    // a retry brings the window back in line
    rig.usb.clear();
    session.set_standard(StdId::PAL).unwrap();
    assert_eq!(rig.usb.writes(), frame_window(Family::Lines625));
}

#[test]
fn query_standard_narrows_to_detection() {
    let rig = Rig::new();
    let session = rig.dev.open();

    assert_eq!(session.query_standard(), standard::SUPPORTED);

    rig.decoder.detect(StdId::PAL_B | StdId::ATSC_8_VSB);
    assert_eq!(session.query_standard(), StdId::PAL_B);
}

#[test]
fn inputs() {
    let rig = Rig::new();
    let session = rig.dev.open();

    assert_eq!(session.enum_inputs(3).unwrap().name, "Composite3");
    assert!(matches!(
        session.enum_inputs(4),
        Err(Error::InvalidArgument(_))
    ));

    rig.usb.clear();
    session.set_input(1).unwrap();
    assert_eq!(session.input(), 1);
    assert_eq!(rig.usb.writes(), vec![(reg::GCTRL, 0x90)]);

    assert!(matches!(
        session.set_input(4),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(session.input(), 1);
}

#[test]
fn raw_registers() {
    let rig = Rig::new();
    let session = rig.dev.open();

    rig.usb.set_register(0x018, 0x5a);
    assert_eq!(session.register(0x018).unwrap(), 0x5a);

    rig.usb.clear();
    session.set_register(0x1a0, 0x44).unwrap();
    assert_eq!(rig.usb.writes(), vec![(0x1a0, 0x44)]);
}

#[test]
fn buffer_count_is_clamped() {
    let rig = Rig::new();
    let session = rig.dev.open();

    assert_eq!(session.request_buffers(1).unwrap().len(), 8);
    session.request_buffers(0).unwrap();
    assert_eq!(session.request_buffers(1000).unwrap().len(), 32);

    let config = Config::default();
    let info = session.query_buffer(31).unwrap();
    assert_eq!(info.length, 720 * 480 * 2);
    assert!(matches!(
        session.query_buffer(config.max_buffers),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn hardware_calls_fail_once_unplugged() {
    let rig = Rig::new();
    let session = rig.dev.open();

    rig.dev.disconnect();
    assert!(!rig.dev.is_connected());

    assert!(matches!(session.query_caps(), Err(Error::NoDevice)));
    assert!(matches!(
        session.set_standard(StdId::PAL),
        Err(Error::NoDevice)
    ));
    assert!(matches!(session.set_input(1), Err(Error::NoDevice)));
    assert!(matches!(session.register(0), Err(Error::NoDevice)));

    // cached state is still readable
    assert_eq!(session.standard(), standard::DEFAULT);
    assert_eq!(session.format().height, 480);
}
