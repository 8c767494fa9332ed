use super::*;

#[test]
fn test_page_request_default() {
    let request = PageRequest::default();
    assert_eq!(request.page, 1);
    assert_eq!(request.per_page, 20);
}

#[test]
fn test_page_request_offset() {
    assert_eq!(PageRequest::new(1, 20).offset(), 0);
    assert_eq!(PageRequest::new(2, 20).offset(), 20);
    assert_eq!(PageRequest::new(5, 10).offset(), 40);
}

#[test]
fn test_page_request_zero_page_is_first() {
    let request = PageRequest::new(0, 10);
    assert_eq!(request.page, 1);
    assert_eq!(request.offset(), 0);
}

#[test]
fn test_page_request_limit() {
    assert_eq!(PageRequest::new(1, 50).limit(), 50);
}

#[test]
fn test_page_response_total_pages() {
    let response = PageResponse::new(vec![1, 2, 3], PageRequest::new(1, 10), 25);
    assert_eq!(response.meta.total_pages, 3);
    assert_eq!(response.meta.total, 25);
    assert_eq!(response.data.len(), 3);
}

#[test]
fn test_page_response_empty() {
    let response: PageResponse<i32> = PageResponse::new(vec![], PageRequest::default(), 0);
    assert_eq!(response.meta.total_pages, 1);
}
