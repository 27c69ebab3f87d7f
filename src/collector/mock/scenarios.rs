//! Canned server responses for tests.

use crate::collector::mysql_collector::{
    GLOBAL_STATUS_QUERY, INNODB_MUTEX_QUERY, INNODB_STATUS_QUERY, PROCESSLIST_QUERY, ResultSet,
    SqlValue,
};

use super::MockConnector;

/// InnoDB report as printed by 5.1.
pub const INNODB_STATUS_51: &str = "
=====================================
110525 14:07:06 INNODB MONITOR OUTPUT
=====================================
Per second averages calculated from the last 16 seconds
----------
SEMAPHORES
----------
OS WAIT ARRAY INFO: reservation count 7, signal count 6
Mutex spin waits 12, rounds 340, OS waits 3
RW-shared spins 4, OS waits 2; RW-excl spins 0, OS waits 1
------------
TRANSACTIONS
------------
Trx id counter 0 1792
Purge done for trx's n:o < 0 0 undo n:o < 0 0
History list length 42
-------------------------------------
INSERT BUFFER AND ADAPTIVE HASH INDEX
-------------------------------------
Ibuf: size 1, free list len 0, seg size 2,
0 inserts, 0 merged recs, 0 merges
Hash table size 17393, node heap has 1 buffer(s)
--------------
ROW OPERATIONS
--------------
0 queries inside InnoDB, 0 queries in queue
1 read views open inside InnoDB
Main thread id 4434, state: waiting for server activity
----------------------------
END OF INNODB MONITOR OUTPUT
============================
";

/// InnoDB report as printed by 5.7.
pub const INNODB_STATUS_57: &str = "
=====================================
2024-03-01 10:15:42 0x7f3a2c1f8700 INNODB MONITOR OUTPUT
=====================================
Per second averages calculated from the last 20 seconds
-----------------
BACKGROUND THREAD
-----------------
srv_master_thread loops: 1 srv_active, 0 srv_shutdown, 2981 srv_idle
----------
SEMAPHORES
----------
OS WAIT ARRAY INFO: reservation count 215
OS WAIT ARRAY INFO: signal count 203
RW-shared spins 0, rounds 40, OS waits 20
RW-excl spins 31, rounds 61, OS waits 2
RW-sx spins 1, rounds 12, OS waits 0
Spin rounds per wait: 40.00 RW-shared, 61.00 RW-excl, 12.00 RW-sx
------------
TRANSACTIONS
------------
Trx id counter 4930
Purge done for trx's n:o < 4928 undo n:o < 0 state: running but idle
History list length 1184
-------------------------------------
INSERT BUFFER AND ADAPTIVE HASH INDEX
-------------------------------------
Ibuf: size 1, free list len 0, seg size 2, 94 merges
merged operations:
 insert 0, delete mark 0, delete 0
--------------
ROW OPERATIONS
--------------
0 queries inside InnoDB, 0 queries in queue
0 read views open inside InnoDB
----------------------------
END OF INNODB MONITOR OUTPUT
============================
";

fn text_rows(columns: &[&str], rows: &[&[&str]]) -> ResultSet {
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        rows.iter()
            .map(|row| row.iter().map(|v| SqlValue::from(*v)).collect())
            .collect(),
    )
}

/// `SHOW GLOBAL STATUS` output with the given pairs.
pub fn global_status(pairs: &[(&str, &str)]) -> ResultSet {
    let rows: Vec<[&str; 2]> = pairs.iter().map(|(k, v)| [*k, *v]).collect();
    let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
    text_rows(&["Variable_name", "Value"], &rows)
}

/// `SHOW ENGINE INNODB STATUS` output wrapping `report`.
pub fn innodb_status(report: &str) -> ResultSet {
    text_rows(&["Type", "Name", "Status"], &[&["InnoDB", "", report]])
}

/// `SHOW PROCESSLIST` output with one row per command.
pub fn processlist(commands: &[&str]) -> ResultSet {
    let columns = ["Id", "User", "Host", "db", "Command", "Time", "State", "Info"];
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        commands
            .iter()
            .enumerate()
            .map(|(i, cmd)| {
                vec![
                    SqlValue::UInt(i as u64 + 1),
                    SqlValue::from("app"),
                    SqlValue::from("localhost:51234"),
                    SqlValue::Null,
                    SqlValue::from(*cmd),
                    SqlValue::from("0"),
                    SqlValue::from(""),
                    SqlValue::Null,
                ]
            })
            .collect(),
    )
}

/// `SHOW SLAVE STATUS` output for a replica of `master_host`.
pub fn slave_status(master_host: &str, io_running: &str, lag: &str) -> ResultSet {
    text_rows(
        &[
            "Slave_IO_State",
            "Master_Host",
            "Master_Port",
            "Read_Master_Log_Pos",
            "Slave_IO_Running",
            "Slave_SQL_Running",
            "Exec_Master_Log_Pos",
            "Seconds_Behind_Master",
        ],
        &[&[
            "Waiting for master to send event",
            master_host,
            "3306",
            "4096",
            io_running,
            "Yes",
            "4000",
            lag,
        ]],
    )
}

/// `SHOW ENGINE INNODB MUTEX` output.
pub fn innodb_mutex(rows: &[(&str, &str)]) -> ResultSet {
    let rows: Vec<[&str; 3]> = rows.iter().map(|(n, s)| ["InnoDB", *n, *s]).collect();
    let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
    text_rows(&["Type", "Name", "Status"], &rows)
}

/// Registers a 5.1 InnoDB replica at `address` with a populated status
/// snapshot, report, replication state and process list.
pub fn typical_server(connector: &MockConnector, address: &str) {
    connector.add_server(address, "5.1.73-log");
    connector.set_response(
        address,
        GLOBAL_STATUS_QUERY,
        global_status(&[
            ("Uptime", "86400"),
            ("Threads_connected", "3"),
            ("Ssl_cipher", ""),
            ("Innodb_buffer_pool_pages_data", "512"),
        ]),
    );
    connector.set_response(address, INNODB_STATUS_QUERY, innodb_status(INNODB_STATUS_51));
    connector.set_response(
        address,
        INNODB_MUTEX_QUERY,
        innodb_mutex(&[("srv0srv.c:971:&kernel_mutex", "os_waits=2")]),
    );
    connector.set_response(
        address,
        "SHOW SLAVE STATUS",
        slave_status("db1.internal", "Yes", "0"),
    );
    connector.set_response(
        address,
        PROCESSLIST_QUERY,
        processlist(&["Query", "Sleep", "Sleep"]),
    );
}
