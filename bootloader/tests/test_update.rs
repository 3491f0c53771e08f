// Licensed under the Apache-2.0 license

mod common;

use common::*;
use dfu_bootloader::update_sm::States;
use dfu_bootloader::{BootError, DfuRequest, TransportEvent, UpdateOutcome, UpdateSession};
use dfu_config::boot::{Bank, BankStatus, BootloaderSettings};
use dfu_engine::crc::crc16_compute;
use dfu_engine::DfuPacket;
use dfu_error::code;
use flash_storage::FlashDrvError;
use zerocopy::IntoBytes;

#[test]
fn test_full_update_commits_settings() {
    let mut bootloader = setup_bootloader();
    let image = test_image(4 * PACKET_BYTES);
    let crc = crc16_compute(&image);
    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(update_script(&image, crc));

    let outcome = bootloader.run_update(&mut transport, &mut pump).unwrap();
    assert_eq!(outcome, UpdateOutcome::Complete);

    let settings = bootloader.settings().unwrap();
    assert_eq!(settings.bank_0_status(), BankStatus::ValidApp);
    assert_eq!(settings.bank_0_crc(), crc);
    assert_eq!(settings.bank_0_size(), image.len() as u32);
    assert_eq!(settings.bank_1_status(), BankStatus::InvalidApp);

    let app_start = bootloader.layout().app_start;
    assert_eq!(
        bootloader.storage().driver().contents(app_start, image.len()),
        &image[..]
    );
    assert!(bootloader.app_is_valid(Bank::Bank0));

    assert!(transport.opened);
    assert!(!transport.closed);
    assert!(transport
        .responses
        .iter()
        .all(|(_, status)| *status == code::SUCCESS));
    let offsets: Vec<u32> = transport.written.iter().map(|w| w.offset).collect();
    assert_eq!(offsets, vec![0, 256, 512, 768]);
    assert!(transport.written.iter().all(|w| w.len == PACKET_BYTES as u32));
}

#[test]
fn test_timeout_before_image_size_keeps_settings() {
    let mut bootloader = setup_bootloader();
    let layout = *bootloader.layout();
    let previous = BootloaderSettings::new(BankStatus::ValidApp, 0, 2048, BankStatus::InvalidApp);
    bootloader
        .storage_mut()
        .driver_mut()
        .program(layout.settings_address, previous.as_bytes());

    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(vec![TransportEvent::Timeout]);
    let outcome = bootloader.run_update(&mut transport, &mut pump).unwrap();
    assert_eq!(outcome, UpdateOutcome::Timeout);

    let flash = bootloader.storage().driver();
    assert_eq!(
        flash.contents(layout.settings_address, BootloaderSettings::SIZE),
        previous.as_bytes()
    );
    assert_eq!(flash.erase_count(), 0);
    assert_eq!(flash.write_count(), 0);
    assert!(transport.closed);
}

#[test]
fn test_reset_after_erase_leaves_bank_erased() {
    let mut bootloader = setup_bootloader();
    let image = test_image(2 * PACKET_BYTES);
    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(vec![
        TransportEvent::ImageSize(image.len() as u32),
        TransportEvent::DataPacket(DfuPacket::from_bytes(&image[..PACKET_BYTES]).unwrap()),
        TransportEvent::Reset,
    ]);

    let outcome = bootloader.run_update(&mut transport, &mut pump).unwrap();
    assert_eq!(outcome, UpdateOutcome::Reset);
    assert!(transport.closed);
    assert_eq!(transport.written.len(), 1);

    let settings = bootloader.settings().unwrap();
    assert_eq!(settings.bank_0_status(), BankStatus::Erased);
    assert_eq!(settings.bank_0_crc(), 0);
    assert_eq!(settings.bank_0_size(), 0);
    assert!(!bootloader.app_is_valid(Bank::Bank0));
}

#[test]
fn test_crc_mismatch_is_reported_to_peer() {
    let mut bootloader = setup_bootloader();
    let image = test_image(PACKET_BYTES);
    let crc = crc16_compute(&image);
    let wrong = if crc == 0xBEEF { 0xBEEE } else { 0xBEEF };

    let mut script = update_script(&image, wrong);
    script.push(TransportEvent::Reset);
    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(script);

    let outcome = bootloader.run_update(&mut transport, &mut pump).unwrap();
    assert_eq!(outcome, UpdateOutcome::Reset);
    assert_eq!(
        transport.responses_to(DfuRequest::Validate),
        vec![code::INVALID_DATA]
    );
    assert_eq!(
        transport.responses_to(DfuRequest::Activate),
        vec![code::INVALID_STATE]
    );
    assert_eq!(
        bootloader.settings().unwrap().bank_0_status(),
        BankStatus::Erased
    );
}

#[test]
fn test_rejected_requests_keep_session_running() {
    let mut bootloader = setup_bootloader();
    let image = test_image(PACKET_BYTES);
    let mut script = vec![
        TransportEvent::DataPacket(DfuPacket::from_bytes(&image[..16]).unwrap()),
        TransportEvent::ImageSize(6),
        TransportEvent::ImageSize(bootloader.layout().app_max_size + 4),
    ];
    script.extend(update_script(&image, 0));
    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(script);

    let outcome = bootloader.run_update(&mut transport, &mut pump).unwrap();
    assert_eq!(outcome, UpdateOutcome::Complete);
    assert_eq!(
        transport.responses_to(DfuRequest::DataPacket),
        vec![code::INVALID_STATE, code::SUCCESS]
    );
    assert_eq!(
        transport.responses_to(DfuRequest::ImageSize),
        vec![code::NOT_SUPPORTED, code::DATA_SIZE, code::SUCCESS]
    );

    // No CRC requested: the computed one is recorded.
    let settings = bootloader.settings().unwrap();
    assert_eq!(settings.bank_0_crc(), crc16_compute(&image));
    assert!(bootloader.app_is_valid(Bank::Bank0));
}

#[test]
fn test_settings_saving_waits_for_flash() {
    let mut bootloader = setup_bootloader();
    let layout = *bootloader.layout();
    let image = test_image(2 * PACKET_BYTES);
    let crc = crc16_compute(&image);
    let mut script = update_script(&image, crc);
    let activate = script.pop().unwrap();

    let mut transport = MockTransport::default();
    {
        let mut session =
            UpdateSession::start(bootloader.storage_mut(), &mut transport, &layout).unwrap();
        assert_eq!(session.state(), States::Updating);
        for event in script {
            session.handle_transport_event(event).unwrap();
            session.process_flash_events().unwrap();
        }
        assert_eq!(session.state(), States::Updating);

        session.storage_mut().driver_mut().set_hold(true);
        session.handle_transport_event(activate).unwrap();
        session.process_flash_events().unwrap();
        assert_eq!(session.state(), States::SettingsSaving);
        assert_eq!(session.outcome(), None);
        assert_eq!(
            session.settings().unwrap().bank_0_status(),
            BankStatus::Erased
        );

        // A timeout cannot interrupt the settings write.
        session
            .handle_transport_event(TransportEvent::Timeout)
            .unwrap();
        assert_eq!(session.state(), States::SettingsSaving);

        session.storage_mut().driver_mut().set_hold(false);
        session.process_flash_events().unwrap();
        assert_eq!(session.state(), States::Complete);
        assert_eq!(session.outcome(), Some(UpdateOutcome::Complete));
        assert_eq!(
            session.settings().unwrap().bank_0_status(),
            BankStatus::ValidApp
        );
    }
    assert!(!transport.closed);
    assert_eq!(bootloader.settings().unwrap().bank_0_crc(), crc);
}

#[test]
fn test_flash_failure_ends_session() {
    let mut bootloader = setup_bootloader();
    let page_size = bootloader.layout().page_size;
    let app_start = bootloader.layout().app_start;
    bootloader
        .storage_mut()
        .driver_mut()
        .fail_at(Some(app_start + 2 * page_size));

    let image = test_image(PACKET_BYTES);
    let mut transport = MockTransport::default();
    let mut pump = ScriptedPump::new(update_script(&image, 0));

    assert_eq!(
        bootloader.run_update(&mut transport, &mut pump),
        Err(BootError::Flash(FlashDrvError::FAIL))
    );
    assert!(transport.written.is_empty());
}
