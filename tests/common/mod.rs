#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::Path;

pub struct Event {
    pub rowid: &'static str,
    pub timestamp: &'static str,
    pub vehicle_number: &'static str,
    pub vehicle_type: &'static str,
    pub axles: &'static str,
    pub vehicle_code: &'static str,
    pub tollplaza_id: &'static str,
    pub tollplaza_code: &'static str,
    pub payment_code: &'static str,
    pub payment_vehicle_code: &'static str,
}

pub const EVENTS: [Event; 5] = [
    Event {
        rowid: "1",
        timestamp: "Thu Aug 19 21:54:38 2021",
        vehicle_number: "125094",
        vehicle_type: "car",
        axles: "2",
        vehicle_code: "VC965",
        tollplaza_id: "4856",
        tollplaza_code: "PC7C042B7",
        payment_code: "PTE",
        payment_vehicle_code: "VC965",
    },
    Event {
        rowid: "2",
        timestamp: "Sat Jul 31 04:09:44 2021",
        vehicle_number: "174434",
        vehicle_type: "car",
        axles: "2",
        vehicle_code: "VC965",
        tollplaza_id: "4154",
        tollplaza_code: "PC2C2EF9E",
        payment_code: "PTP",
        payment_vehicle_code: "VC965",
    },
    Event {
        rowid: "3",
        timestamp: "Sat Aug 14 17:19:04 2021",
        vehicle_number: "8538286",
        vehicle_type: "truck",
        axles: "4",
        vehicle_code: "VC4A2B1",
        tollplaza_id: "4154",
        tollplaza_code: "PC2C2EF9E",
        payment_code: "PTE",
        payment_vehicle_code: "VC4A2B1",
    },
    Event {
        rowid: "4",
        timestamp: "Mon Aug  2 18:23:45 2021",
        vehicle_number: "5521221",
        vehicle_type: "Van",
        axles: "3",
        vehicle_code: "VCB8B2C",
        tollplaza_id: "8026",
        tollplaza_code: "PCD0E0A26",
        payment_code: "PTC",
        payment_vehicle_code: "VCB8B2C",
    },
    Event {
        rowid: "5",
        timestamp: "Thu Jul 29 22:44:20 2021",
        vehicle_number: "3267767",
        vehicle_type: "TRUCK",
        axles: "5",
        vehicle_code: "VC1E71B",
        tollplaza_id: "4856",
        tollplaza_code: "PC7C042B7",
        payment_code: "PTP",
        payment_vehicle_code: "VC1E71B",
    },
];

const PAYMENT_WIDTHS: [usize; 7] = [6, 20, 15, 8, 10, 20, 10];

pub fn vehicle_data() -> String {
    EVENTS
        .iter()
        .map(|e| {
            format!(
                "{},{},{},{},{},{}\n",
                e.rowid, e.timestamp, e.vehicle_number, e.vehicle_type, e.axles, e.vehicle_code
            )
        })
        .collect()
}

pub fn tollplaza_data() -> String {
    EVENTS
        .iter()
        .map(|e| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                e.rowid,
                e.timestamp,
                e.vehicle_number,
                e.vehicle_type,
                e.axles,
                e.tollplaza_id,
                e.tollplaza_code
            )
        })
        .collect()
}

pub fn payment_data() -> String {
    EVENTS
        .iter()
        .map(|e| {
            // the timestamp column is 20 wide, so long timestamps are cut
            let timestamp: String = e.timestamp.chars().take(PAYMENT_WIDTHS[1] - 1).collect();
            let fields = [
                e.rowid,
                timestamp.as_str(),
                e.vehicle_number,
                e.tollplaza_id,
                e.tollplaza_code,
                e.payment_code,
                e.payment_vehicle_code,
            ];
            let mut line: String = fields
                .iter()
                .zip(PAYMENT_WIDTHS)
                .map(|(f, w)| format!("{:<width$}", f, width = w))
                .collect();
            line.push('\n');
            line
        })
        .collect()
}

/// Expected final record set: the projected fixture fields with the vehicle
/// type uppercased.
pub fn expected_transformed() -> String {
    let mut out = String::from(
        "Rowid,Timestamp,Anonymized Vehicle number,Vehicle type,\
         Number of axles,Tollplaza id,Tollplaza code,\
         Type of Payment code,Vehicle Code\n",
    );
    for e in &EVENTS {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            e.rowid,
            e.timestamp,
            e.vehicle_number,
            e.vehicle_type.to_uppercase(),
            e.axles,
            e.tollplaza_id,
            e.tollplaza_code,
            e.payment_code,
            e.payment_vehicle_code
        ));
    }
    out
}

pub fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// The three raw sources plus the format notes file the real archive ships.
pub fn write_toll_archive(path: &Path) {
    let vehicle = vehicle_data();
    let tollplaza = tollplaza_data();
    let payment = payment_data();
    write_archive(
        path,
        &[
            ("vehicle-data.csv", vehicle.as_bytes()),
            ("tollplaza-data.tsv", tollplaza.as_bytes()),
            ("payment-data.txt", payment.as_bytes()),
            ("fileformats.txt", &b"field layouts for the three sources\n"[..]),
        ],
    );
}
