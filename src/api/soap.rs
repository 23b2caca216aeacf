//! SOAP 1.2 envelope for the one legacy call the tool makes: `ClearData`
//! on a data extension, addressed by its customer key.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

pub const CONTENT_TYPE: &str = "application/soap+xml; charset=UTF-8";

pub fn clear_data_envelope(soap_url: &str, access_token: &str, customer_key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
    <s:Header>
        <a:Action s:mustUnderstand="1">Perform</a:Action>
        <a:To s:mustUnderstand="1">{to}</a:To>
        <fueloauth xmlns="http://exacttarget.com">{token}</fueloauth>
    </s:Header>
    <s:Body xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
        <PerformRequestMsg xmlns="http://exacttarget.com/wsdl/partnerAPI">
            <Action>ClearData</Action>
            <Definitions>
                <Definition xsi:type="DataExtension">
                    <CustomerKey>{key}</CustomerKey>
                </Definition>
            </Definitions>
        </PerformRequestMsg>
    </s:Body>
</s:Envelope>"#,
        to = escape(soap_url),
        token = escape(access_token),
        key = escape(customer_key),
    )
}

/// Text of the first `OverallStatus` element, if the response has one.
pub fn overall_status(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => inside = e.local_name().as_ref() == b"OverallStatus",
            Ok(Event::Text(t)) if inside => {
                return t.unescape().ok().map(|s| s.into_owned());
            }
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
