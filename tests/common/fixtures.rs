//! Canned upstream payloads used across harnesses.

use serde_json::{json, Value};

/// A successful AMap live-weather answer for Dongcheng, Beijing.
pub fn amap_live(reporttime: &str) -> Value {
    json!({
        "status": "1",
        "count": "1",
        "info": "OK",
        "infocode": "10000",
        "lives": [{
            "province": "北京",
            "city": "东城区",
            "adcode": "110101",
            "weather": "晴",
            "temperature": "3",
            "winddirection": "西北",
            "windpower": "≤3",
            "humidity": "20",
            "reporttime": reporttime,
            "temperature_float": "3.0",
            "humidity_float": "20.0"
        }]
    })
}

/// AMap's answer to a bad key.
pub fn amap_invalid_key() -> Value {
    json!({
        "status": "0",
        "info": "INVALID_USER_KEY",
        "infocode": "10001"
    })
}

/// A gTLD registry record in the shape Verisign returns.
pub const WHOIS_EXAMPLE_COM: &str = "\
   Domain Name: EXAMPLE.COM\r
   Registrar WHOIS Server: whois.example-registrar.test\r
   Updated Date: 2024-08-14T07:01:34Z\r
   Creation Date: 1995-08-14T04:00:00Z\r
   Registry Expiry Date: 2099-08-13T04:00:00Z\r
   Registrar: Example Registrar, Inc.\r
   Domain Status: clientTransferProhibited https://icann.org/epp#clientTransferProhibited\r
   Name Server: A.IANA-SERVERS.NET\r
   Name Server: B.IANA-SERVERS.NET\r
>>> Last update of whois database: 2024-09-01T00:00:00Z <<<\r
";

/// A CNNIC record.
pub const WHOIS_EXAMPLE_CN: &str = "\
Domain Name: example.cn
Domain Status: ok
Sponsoring Registrar: 阿里云计算有限公司（万网）
Name Server: dns1.example.cn
Registration Time: 2003-03-17 12:20:05
Expiration Time: 2099-03-17 12:48:36
";
